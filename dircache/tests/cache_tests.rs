//! End-to-end tests of the query cache over an in-memory directory
//!
//! Covers answerability, LRU eviction order, TTL expiry, tag accounting,
//! negative caching and admission refusals.

#[path = "testutils/mod.rs"]
mod testutils;

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dircache::{
    Admission, AttributeSetConfig, CacheConfig, CacheManager, CollectingSink, DefaultSchema, Dn,
    ManualClock, MemoryBackend, MemoryStore, Query, QueryTag, Record, RecordStore, Scope,
    SearchBackend, SearchOutcome, SearchStatus, TemplateConfig, MAX_TTL_SECS,
};
use serial_test::serial;
use testutils::sample_data::{self, PEOPLE_BASE};
use testutils::test_fixture::CacheFixture;

fn sorted_dns(sink: &CollectingSink) -> Vec<String> {
    let mut dns: Vec<String> = sink.entries.iter().map(|e| e.dn.to_string()).collect();
    dns.sort();
    dns
}

fn admitted_id(outcome: &SearchOutcome) -> u64 {
    match outcome {
        SearchOutcome::Live(Admission::Admitted { query_id, .. }) => *query_id,
        other => panic!("expected admission, got {:?}", other),
    }
}

#[test]
fn test_descendant_base_answered_from_cache() {
    let backend = MemoryBackend::new();
    for dn in [
        "cn=alice,ou=people,dc=x",
        "cn=alice,ou=eng,ou=people,dc=x",
        "cn=alice,ou=ops,ou=people,dc=x",
        "cn=bob,ou=people,dc=x",
    ] {
        let name = if dn.starts_with("cn=alice") { "alice" } else { "bob" };
        backend.insert(Record::new(Dn::parse(dn).unwrap()).with_attribute("cn", [name]));
    }

    let config = CacheConfig::new()
        .with_attribute_set(AttributeSetConfig::new("all", ["*"]))
        .with_template(TemplateConfig::new("(cn=)", 0, 60))
        .with_sweep_period_secs(5);
    let fixture = CacheFixture::with_backend(config, backend);

    let first = Query::parse("ou=people,dc=x", Scope::Subtree, "(cn=alice)").unwrap();
    let (outcome, sink) = fixture.search(&first);
    assert!(matches!(outcome, SearchOutcome::Live(Admission::Admitted { records: 3, .. })));
    assert_eq!(sink.entries.len(), 3);
    let first_id = admitted_id(&outcome);

    // Descendant base, narrower scope
    let narrower = Query::parse("cn=alice,ou=eng,ou=people,dc=x", Scope::Base, "(cn=alice)").unwrap();
    let (outcome, sink) = fixture.search(&narrower);
    assert_eq!(
        outcome,
        SearchOutcome::Hit {
            template_id: 0,
            query_id: first_id,
            entries: 1
        }
    );
    assert_eq!(sorted_dns(&sink), vec!["cn=alice,ou=eng,ou=people,dc=x"]);
    assert_eq!(fixture.backend.search_count(), 1);

    // Substring is not implied by the cached equality; it is admitted on its own
    let substring = Query::parse("ou=people,dc=x", Scope::Subtree, "(cn=ali*)").unwrap();
    let (outcome, _) = fixture.search(&substring);
    assert!(matches!(outcome, SearchOutcome::Live(Admission::Admitted { records: 3, .. })));
    assert_eq!(fixture.backend.search_count(), 2);

    // TTL plus one sweep period later the query is gone
    fixture.clock.advance_secs(61 + 5);
    let report = fixture.cache.expire_stale();
    assert_eq!(report.expired, 2);
    assert!(!fixture.cache.is_cached(first_id));
    assert_eq!(fixture.stored_records(), 0);
    let (outcome, _) = fixture.search(&narrower);
    assert!(!outcome.is_hit());
}

#[test]
fn test_hit_matches_live_answer() {
    let fixture = CacheFixture::new();

    let broad = CacheFixture::people_query("(uidNumber>=1005)");
    let (outcome, live) = fixture.search(&broad);
    assert!(matches!(outcome, SearchOutcome::Live(Admission::Admitted { records: 4, .. })));

    let narrow = CacheFixture::people_query("(uidNumber>=1007)");
    let (outcome, cached) = fixture.search(&narrow);
    assert!(outcome.is_hit());
    assert_eq!(
        sorted_dns(&cached),
        vec![
            "cn=frank,ou=people,dc=example".to_string(),
            "cn=grace,ou=people,dc=example".to_string()
        ]
    );
    assert!(sorted_dns(&live).len() > cached.entries.len());

    // Broader than the cached bound is a miss
    let (outcome, _) = fixture.search(&CacheFixture::people_query("(uidNumber>=1004)"));
    assert!(!outcome.is_hit());
}

#[test]
fn test_hit_is_promoted_and_lru_tail_evicted() {
    let config = sample_data::people_config().with_max_cached_records(2);
    let fixture = CacheFixture::with_config(config);

    let alice = admitted_id(&fixture.search(&CacheFixture::people_query("(cn=alice)")).0);
    let bob = admitted_id(&fixture.search(&CacheFixture::people_query("(cn=bob)")).0);
    let carol = admitted_id(&fixture.search(&CacheFixture::people_query("(cn=carol)")).0);
    assert_eq!(fixture.cache.lru_order(), vec![carol, bob, alice]);

    // Hit moves alice to the head
    let (outcome, _) = fixture.search(&CacheFixture::people_query("(cn=ALICE)"));
    assert_eq!(outcome.query_id(), Some(alice));
    assert_eq!(fixture.cache.lru_order(), vec![alice, carol, bob]);

    // Three records cached against a budget of two: the next admission evicts bob
    let dave = admitted_id(&fixture.search(&CacheFixture::people_query("(cn=dave)")).0);
    assert!(!fixture.cache.is_cached(bob));
    assert!(fixture.cache.is_cached(alice));
    assert_eq!(fixture.cache.lru_order(), vec![dave, alice, carol]);

    let bob_dn = Dn::parse(&format!("cn=bob,{}", PEOPLE_BASE)).unwrap();
    assert!(fixture.store.get(&bob_dn).is_none());

    let stats = fixture.cache.stats();
    assert_eq!(stats.lru_evictions, 1);
    assert_eq!(stats.cached_queries, 3);
    assert_eq!(stats.cached_records, fixture.stored_records());
}

#[test]
fn test_repeated_evictions_take_strict_lru_tail() {
    let config = sample_data::people_config().with_max_cached_records(2);
    let fixture = CacheFixture::with_config(config);
    let admit = |name: &str| {
        admitted_id(&fixture.search(&CacheFixture::people_query(&format!("(cn={})", name))).0)
    };

    let alice = admit("alice");
    let bob = admit("bob");
    let carol = admit("carol");

    let dave = admit("dave");
    assert!(!fixture.cache.is_cached(alice));
    assert_eq!(fixture.cache.lru_order(), vec![dave, carol, bob]);

    let erin = admit("erin");
    assert!(!fixture.cache.is_cached(bob));
    assert_eq!(fixture.cache.lru_order(), vec![erin, dave, carol]);

    // carol was next in line; the hit moves dave to the tail instead
    let (outcome, _) = fixture.search(&CacheFixture::people_query("(cn=carol)"));
    assert_eq!(outcome.query_id(), Some(carol));
    assert_eq!(fixture.cache.lru_order(), vec![carol, erin, dave]);

    let frank = admit("frank");
    assert!(!fixture.cache.is_cached(dave));
    assert!(fixture.cache.is_cached(carol));
    assert_eq!(fixture.cache.lru_order(), vec![frank, carol, erin]);

    let stats = fixture.cache.stats();
    assert_eq!(stats.lru_evictions, 3);
    assert_eq!(stats.cached_records, fixture.stored_records());
}

#[test]
fn test_cleared_query_is_readmitted() {
    let fixture = CacheFixture::new();
    let contact = CacheFixture::people_query("(cn=erin)").with_attributes(["cn", "mail"]);

    let (outcome, first) = fixture.search(&contact);
    assert!(matches!(
        outcome,
        SearchOutcome::Live(Admission::Admitted { template_id: 4, records: 1, .. })
    ));
    let first_id = admitted_id(&outcome);

    fixture.cache.clear();
    assert!(!fixture.cache.is_cached(first_id));
    assert_eq!(fixture.stored_records(), 0);
    assert_eq!(fixture.cache.stats().cached_queries, 0);

    let (outcome, again) = fixture.search(&contact);
    assert!(matches!(
        outcome,
        SearchOutcome::Live(Admission::Admitted { template_id: 4, records: 1, .. })
    ));
    assert_ne!(admitted_id(&outcome), first_id);
    assert_eq!(again.entries, first.entries);
    assert_eq!(fixture.backend.search_count(), 2);

    let (outcome, cached) = fixture.search(&contact);
    assert!(matches!(outcome, SearchOutcome::Hit { template_id: 4, entries: 1, .. }));
    assert_eq!(cached.entries, first.entries);
    assert_eq!(fixture.backend.search_count(), 2);
}

#[test]
fn test_longest_ttl_admits_and_expires() {
    let config = CacheConfig::new()
        .with_attribute_set(AttributeSetConfig::new("all", ["*"]))
        .with_template(
            TemplateConfig::new("(cn=)", 0, MAX_TTL_SECS).with_negative_ttl(MAX_TTL_SECS),
        );
    let fixture = CacheFixture::with_config(config);
    let ttl = MAX_TTL_SECS as i64;

    let query = CacheFixture::people_query("(cn=grace)");
    let id = admitted_id(&fixture.search(&query).0);
    let missing = CacheFixture::people_query("(cn=nobody)");
    assert!(matches!(
        fixture.search(&missing).0,
        SearchOutcome::Live(Admission::AdmittedNegative { .. })
    ));

    fixture.clock.advance_secs(ttl - 1);
    assert!(fixture.search(&query).0.is_hit());
    assert!(matches!(fixture.search(&missing).0, SearchOutcome::NegativeHit { .. }));

    fixture.clock.advance_secs(2);
    assert_eq!(fixture.cache.expire_stale().expired, 2);
    assert!(!fixture.cache.is_cached(id));
}

#[test]
fn test_records_left_in_store_are_discarded_at_startup() {
    let store = Arc::new(MemoryStore::new());
    store
        .add(&sample_data::person("alice", 1001), &QueryTag::from("stale"))
        .unwrap();
    assert_eq!(store.len().unwrap(), 1);

    let cache = CacheManager::with_components(
        sample_data::people_config(),
        store.clone(),
        Arc::new(DefaultSchema::new()),
        Arc::new(ManualClock::starting_now()),
    )
    .unwrap();
    assert_eq!(store.len().unwrap(), 0);

    // Nothing owns alice, so the search goes to the directory
    let mut sink = CollectingSink::new();
    let outcome = cache
        .search(
            &CacheFixture::people_query("(cn=alice)"),
            &sample_data::people_directory(),
            &mut sink,
        )
        .unwrap();
    assert!(matches!(outcome, SearchOutcome::Live(Admission::Admitted { records: 1, .. })));
    assert_eq!(cache.stats().cached_records, 1);
}

#[test]
fn test_expired_query_is_not_returned_before_sweep() {
    let fixture = CacheFixture::new();
    let query = CacheFixture::people_query("(cn=erin)");
    let id = admitted_id(&fixture.search(&query).0);

    fixture.clock.advance_secs(59);
    assert!(fixture.search(&query).0.is_hit());

    fixture.clock.advance_secs(2);
    // Still linked until a sweep runs, but no longer answers
    assert!(fixture.cache.is_cached(id));
    let (outcome, _) = fixture.search(&query);
    assert!(!outcome.is_hit());
}

#[test]
fn test_shared_records_survive_eviction_of_one_owner() {
    let fixture = CacheFixture::new();
    let grace_dn = Dn::parse(&format!("cn=grace,{}", PEOPLE_BASE)).unwrap();

    // TTL 60 and TTL 120 templates both return grace
    let by_name = admitted_id(&fixture.search(&CacheFixture::people_query("(cn=grace)")).0);
    let by_sn = admitted_id(
        &fixture
            .search(&CacheFixture::people_query("(&(objectClass=person)(sn=grace*))"))
            .0,
    );
    assert_eq!(fixture.store.get(&grace_dn).unwrap().tags.len(), 2);
    assert_eq!(fixture.stored_records(), 1);
    assert_eq!(fixture.cache.stats().cached_records, 1);

    fixture.clock.advance_secs(61);
    assert_eq!(fixture.cache.expire_stale().expired, 1);
    assert!(!fixture.cache.is_cached(by_name));
    assert!(fixture.cache.is_cached(by_sn));

    let stored = fixture.store.get(&grace_dn).expect("shared record deleted");
    assert_eq!(stored.tags.len(), 1);

    fixture.clock.advance_secs(60);
    assert_eq!(fixture.cache.expire_stale().expired, 1);
    assert!(fixture.store.get(&grace_dn).is_none());

    let stats = fixture.cache.stats();
    assert_eq!(stats.cached_queries, 0);
    assert_eq!(stats.cached_records, 0);
    assert_eq!(stats.expired, 2);
}

#[test]
fn test_negative_entries() {
    let fixture = CacheFixture::new();
    let query = CacheFixture::people_query("(mail=nobody@example.com)");

    let (outcome, sink) = fixture.search(&query);
    assert!(matches!(outcome, SearchOutcome::Live(Admission::AdmittedNegative { .. })));
    assert_eq!(sink.status, Some(SearchStatus::Success));

    let (outcome, sink) = fixture.search(&query);
    assert!(matches!(outcome, SearchOutcome::NegativeHit { template_id: 3, .. }));
    assert!(sink.entries.is_empty());
    assert_eq!(sink.status, Some(SearchStatus::Success));
    assert_eq!(fixture.backend.search_count(), 1);
    assert_eq!(fixture.stored_records(), 0);

    // Negative TTL is 10 seconds
    fixture.clock.advance_secs(11);
    let (outcome, _) = fixture.search(&query);
    assert!(!outcome.is_hit());
    assert_eq!(fixture.backend.search_count(), 2);

    // Templates without a negative TTL do not cache empty answers
    let (outcome, _) = fixture.search(&CacheFixture::people_query("(cn=nobody)"));
    assert_eq!(outcome, SearchOutcome::Live(Admission::EmptyResult));
}

#[test]
fn test_admission_refusals() {
    let fixture = CacheFixture::new();

    let attrs_only = CacheFixture::people_query("(cn=bob)").with_attrs_only(true);
    let (outcome, sink) = fixture.search(&attrs_only);
    assert_eq!(outcome, SearchOutcome::Live(Admission::AttrsOnly));
    assert_eq!(sink.entries.len(), 1);
    assert!(sink.entries[0].values("cn").is_empty());

    // Eight people exceed the per-query limit of five, but the caller sees them all
    let (outcome, sink) = fixture.search(&CacheFixture::people_query("(uidNumber>=1)"));
    assert_eq!(outcome, SearchOutcome::Live(Admission::TooManyRecords));
    assert_eq!(sink.entries.len(), 8);
    assert_eq!(fixture.stored_records(), 0);

    let (outcome, _) = fixture.search(&CacheFixture::people_query("(sn=bobson)"));
    assert_eq!(outcome, SearchOutcome::Live(Admission::NotCacheable));

    assert_eq!(fixture.cache.stats().refused, 2);
    assert_eq!(fixture.cache.stats().cached_queries, 0);
}

#[test]
fn test_query_limit_refuses_admission() {
    let config = sample_data::people_config().with_max_cached_queries(1);
    let fixture = CacheFixture::with_config(config);

    assert!(matches!(
        fixture.search(&CacheFixture::people_query("(cn=alice)")).0,
        SearchOutcome::Live(Admission::Admitted { .. })
    ));
    let (outcome, sink) = fixture.search(&CacheFixture::people_query("(cn=bob)"));
    assert_eq!(outcome, SearchOutcome::Live(Admission::QueryLimitReached));
    assert_eq!(sink.entries.len(), 1);
}

#[test]
fn test_unsuccessful_search_not_cached() {
    let fixture = CacheFixture::with_backend(
        sample_data::people_config(),
        sample_data::people_directory().with_size_limit(1),
    );

    let (outcome, sink) = fixture.search(&CacheFixture::people_query("(uidNumber>=1007)"));
    assert_eq!(
        outcome,
        SearchOutcome::Live(Admission::Failed(SearchStatus::SizeLimitExceeded))
    );
    assert_eq!(sink.status, Some(SearchStatus::SizeLimitExceeded));
    assert_eq!(fixture.cache.stats().cached_queries, 0);
}

#[test]
fn test_abandoned_search_not_cached() {
    struct SilentBackend;

    impl SearchBackend for SilentBackend {
        fn search(&self, _query: &Query, sink: &mut dyn dircache::SearchSink) -> dircache::CacheResult<()> {
            sink.on_entry(&sample_data::person("ghost", 1));
            Ok(())
        }
    }

    let fixture = CacheFixture::new();
    let mut sink = CollectingSink::new();
    let outcome = fixture
        .cache
        .search(&CacheFixture::people_query("(cn=ghost)"), &SilentBackend, &mut sink)
        .unwrap();
    assert_eq!(outcome, SearchOutcome::Live(Admission::Incomplete));
    assert_eq!(sink.entries.len(), 1);
    assert_eq!(fixture.stored_records(), 0);
}

#[test]
fn test_superset_attribute_set_answers_narrower_request() {
    let fixture = CacheFixture::new();

    // Admitted under the all-attributes template
    fixture.search(&CacheFixture::people_query("(cn=carol)"));

    // cn+mail is a subset of all attributes
    let contact = CacheFixture::people_query("(cn=carol)").with_attributes(["mail", "cn"]);
    let (outcome, sink) = fixture.search(&contact);
    assert!(matches!(outcome, SearchOutcome::Hit { template_id: 0, .. }));
    let entry = &sink.entries[0];
    assert!(entry.has_attribute("mail"));
    assert!(entry.has_attribute("cn"));
    assert!(!entry.has_attribute("sn"));

    // The reverse direction is not answerable
    fixture.search(&CacheFixture::people_query("(cn=dave)").with_attributes(["cn", "mail"]));
    let (outcome, _) = fixture.search(&CacheFixture::people_query("(cn=dave)"));
    assert!(!outcome.is_hit());
}

#[test]
fn test_filter_attributes_fetched_for_reevaluation() {
    let config = CacheConfig::new()
        .with_attribute_set(AttributeSetConfig::new("mail", ["mail"]))
        .with_template(TemplateConfig::new("(sn=)", 0, 60));
    let fixture = CacheFixture::with_config(config);

    let query = CacheFixture::people_query("(sn=bob*)").with_attributes(["mail"]);
    let (outcome, sink) = fixture.search(&query);
    assert!(matches!(outcome, SearchOutcome::Live(Admission::Admitted { .. })));
    assert_eq!(sink.entries[0].attributes.keys().collect::<Vec<_>>(), vec!["mail"]);

    // The stored copy carries sn and objectClass even though the caller did not ask
    let bob_dn = Dn::parse(&format!("cn=bob,{}", PEOPLE_BASE)).unwrap();
    let stored = fixture.store.get(&bob_dn).unwrap();
    assert!(stored.record.has_attribute("sn"));
    assert!(stored.record.has_attribute("objectclass"));

    let narrower = CacheFixture::people_query("(sn=bobs*)").with_attributes(["mail"]);
    let (outcome, sink) = fixture.search(&narrower);
    assert!(outcome.is_hit());
    assert_eq!(sink.entries.len(), 1);
    assert_eq!(sink.entries[0].attributes.keys().collect::<Vec<_>>(), vec!["mail"]);
}

#[test]
#[serial]
fn test_sweeper_expires_and_pauses() {
    let fixture = CacheFixture::new();
    let sweeper = fixture
        .cache
        .start_sweeper_every(Duration::from_millis(10))
        .unwrap();
    assert!(fixture.cache.start_sweeper_every(Duration::from_millis(10)).is_err());

    let id = admitted_id(&fixture.search(&CacheFixture::people_query("(cn=frank)")).0);
    fixture.clock.advance_secs(61);

    let deadline = Instant::now() + Duration::from_secs(5);
    while fixture.cache.is_cached(id) || !sweeper.is_paused() {
        assert!(Instant::now() < deadline, "sweeper did not expire and pause");
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(fixture.stored_records(), 0);

    // An admission wakes the paused worker
    fixture.search(&CacheFixture::people_query("(cn=grace)"));
    assert!(!sweeper.is_paused());

    sweeper.shutdown();
    assert!(!fixture.cache.is_sweeper_paused());
    let again = fixture.cache.start_sweeper().unwrap();
    drop(again);
}

#[test]
#[serial]
fn test_sweeper_with_unbounded_period_shuts_down() {
    let fixture = CacheFixture::new();
    let sweeper = fixture.cache.start_sweeper_every(Duration::MAX).unwrap();
    fixture.search(&CacheFixture::people_query("(cn=alice)"));
    sweeper.shutdown();
    assert!(fixture.cache.start_sweeper().is_ok());
}

#[test]
#[serial]
fn test_concurrent_searches_stay_consistent() {
    let config = sample_data::people_config().with_max_cached_records(4);
    let fixture = Arc::new(CacheFixture::with_config(config));
    let filters: Vec<String> = sample_data::PEOPLE
        .iter()
        .flat_map(|(name, uid)| {
            [
                format!("(cn={})", name),
                format!("(uidNumber>={})", uid + 4),
                format!("(mail={}@nowhere)", name),
            ]
        })
        .collect();

    let workers: Vec<_> = (0..6)
        .map(|worker| {
            let fixture = Arc::clone(&fixture);
            let filters = filters.clone();
            thread::spawn(move || {
                for round in 0..150 {
                    let filter = &filters[(worker * 7 + round * 13) % filters.len()];
                    let query = CacheFixture::people_query(filter);

                    let (_, cached) = fixture.search(&query);
                    let mut live = CollectingSink::new();
                    fixture.backend.search(&query, &mut live).unwrap();
                    assert_eq!(sorted_dns(&cached), sorted_dns(&live), "{}", filter);

                    if round % 25 == 0 {
                        fixture.clock.advance_secs(7);
                        fixture.cache.expire_stale();
                    }
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().expect("worker panicked");
    }

    let stats = fixture.cache.stats();
    assert_eq!(stats.cached_queries, stats.template_queries.iter().sum::<usize>());
    assert_eq!(stats.cached_queries, fixture.cache.lru_order().len());
    assert_eq!(stats.cached_records, fixture.stored_records());
    assert!(stats.hits > 0);

    fixture.cache.clear();
    assert_eq!(fixture.store.len().unwrap(), 0);
}
