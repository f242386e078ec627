//! Randomized check that cached answers equal live answers
//!
//! The directory never changes during the run, so every search answered from
//! the cache must return exactly what the backend would have returned.

#[path = "testutils/mod.rs"]
mod testutils;

use std::collections::BTreeMap;

use dircache::{CollectingSink, Query, Scope, SearchBackend};
use testutils::sample_data::{self, PEOPLE, PEOPLE_BASE};
use testutils::test_fixture::CacheFixture;

type Answer = Vec<(String, BTreeMap<String, Vec<String>>)>;

fn normalize(sink: &CollectingSink) -> Answer {
    let mut answer: Answer = sink
        .entries
        .iter()
        .map(|entry| {
            let mut attributes = entry.attributes.clone();
            for values in attributes.values_mut() {
                values.sort();
            }
            (entry.dn.to_string(), attributes)
        })
        .collect();
    answer.sort();
    answer
}

fn random_name(rng: &mut fastrand::Rng) -> &'static str {
    PEOPLE[rng.usize(..PEOPLE.len())].0
}

fn random_prefix(rng: &mut fastrand::Rng) -> String {
    let name = random_name(rng);
    name[..rng.usize(1..=name.len())].to_string()
}

/// Pieces of a name in order, for multi-fragment substring assertions
fn random_fragments(rng: &mut fastrand::Rng, name: &str) -> Vec<String> {
    let mut cuts: Vec<usize> = (0..rng.usize(1..=3)).map(|_| rng.usize(..=name.len())).collect();
    cuts.sort_unstable();
    cuts.dedup();
    let mut start = 0;
    let mut pieces = Vec::new();
    for cut in cuts {
        if cut > start {
            let end = rng.usize(start + 1..=cut);
            pieces.push(name[start..end].to_string());
        }
        start = cut;
    }
    if pieces.is_empty() {
        pieces.push(name[..1].to_string());
    }
    pieces
}

fn random_filter(rng: &mut fastrand::Rng) -> String {
    match rng.usize(..12) {
        0 => format!("(cn={})", random_name(rng)),
        1 => format!("(cn={}*)", random_prefix(rng)),
        2 => {
            let name = random_name(rng);
            let start = rng.usize(..name.len());
            format!("(cn=*{}*)", &name[start..])
        }
        3 => format!("(uidNumber>={})", 1000 + rng.u32(..10)),
        4 => format!("(&(objectClass=person)(sn={}*))", random_prefix(rng)),
        5 => format!("(mail={}@example.com)", random_name(rng)),
        6 => format!("(mail={}@nowhere)", random_name(rng)),
        7 => format!("(uidNumber<={})", 1000 + rng.u32(..10)),
        8 => {
            // Final fragment, with or without initial and any fragments
            let name = random_name(rng);
            let pieces = random_fragments(rng, name);
            let tail = &name[rng.usize(..name.len())..];
            if rng.bool() {
                format!("(cn={}*{})", pieces.join("*"), tail)
            } else {
                format!("(cn=*{})", tail)
            }
        }
        9 => {
            let name = random_name(rng);
            format!("(cn=*{}*)", random_fragments(rng, name).join("*"))
        }
        10 => format!("(|(cn={})(sn={}*))", random_name(rng), random_prefix(rng)),
        _ => format!("(!(cn={}))", random_name(rng)),
    }
}

fn random_query(rng: &mut fastrand::Rng) -> Query {
    let base = match rng.usize(..3) {
        0 => PEOPLE_BASE.to_string(),
        1 => "dc=example".to_string(),
        _ => format!("cn={},{}", random_name(rng), PEOPLE_BASE),
    };
    let scope = [Scope::Base, Scope::OneLevel, Scope::Subtree][rng.usize(..3)];
    let query = Query::parse(&base, scope, &random_filter(rng)).expect("Invalid query");
    if rng.u8(..4) == 0 {
        query.with_attributes(["cn", "mail"])
    } else {
        query
    }
}

#[test]
fn test_cached_answers_equal_live_answers() {
    let config = sample_data::people_config().with_max_cached_records(6);
    let fixture = CacheFixture::with_config(config);
    let mut rng = fastrand::Rng::with_seed(0x5eed);

    for round in 0..2000 {
        let query = random_query(&mut rng);
        let (outcome, cached) = fixture.search(&query);

        let mut live = CollectingSink::new();
        fixture.backend.search(&query, &mut live).unwrap();
        assert_eq!(
            normalize(&cached),
            normalize(&live),
            "round {}: {} answered as {:?}",
            round,
            query,
            outcome
        );

        if rng.u8(..20) == 0 {
            fixture.clock.advance_secs(rng.i64(1..40));
            fixture.cache.expire_stale();
        }
    }

    let stats = fixture.cache.stats();
    assert!(stats.hits > 0);
    assert!(stats.lru_evictions > 0);
    assert_eq!(stats.cached_records, fixture.stored_records());
}
