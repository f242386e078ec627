//! Sample directory entries and cache configurations

use dircache::{AttributeSetConfig, CacheConfig, Dn, MemoryBackend, Record, TemplateConfig};

pub const PEOPLE_BASE: &str = "ou=people,dc=example";

/// `cn=<name>,ou=people,dc=example` with cn, sn, mail, uidNumber and objectClass
pub fn person(name: &str, uid_number: u32) -> Record {
    Record::new(Dn::parse(&format!("cn={},{}", name, PEOPLE_BASE)).unwrap())
        .with_attribute("objectClass", ["person", "top"])
        .with_attribute("cn", [name])
        .with_attribute("sn", [format!("{}son", name)])
        .with_attribute("mail", [format!("{}@example.com", name)])
        .with_attribute("uidNumber", [uid_number.to_string()])
}

pub const PEOPLE: &[(&str, u32)] = &[
    ("alice", 1001),
    ("alicia", 1002),
    ("bob", 1003),
    ("carol", 1004),
    ("dave", 1005),
    ("erin", 1006),
    ("frank", 1007),
    ("grace", 1008),
];

/// Directory with the sample people plus their container entry
pub fn people_directory() -> MemoryBackend {
    let backend = MemoryBackend::new();
    backend.insert(
        Record::new(Dn::parse(PEOPLE_BASE).unwrap())
            .with_attribute("objectClass", ["organizationalUnit"])
            .with_attribute("ou", ["people"]),
    );
    for (name, uid) in PEOPLE {
        backend.insert(person(name, *uid));
    }
    backend
}

/// Templates over every attribute: `(cn=)`, `(uidnumber>=)`, `(&(objectclass=)(sn=))`
/// and `(mail=)` with negative caching, then `(cn=)` on the `cn mail` set,
/// then `(uidnumber<=)`, `(|(cn=)(sn=))` and `(!(cn=))` over every attribute.
pub fn people_config() -> CacheConfig {
    CacheConfig::new()
        .with_attribute_set(AttributeSetConfig::new("all", ["*"]))
        .with_attribute_set(AttributeSetConfig::new("contact", ["cn", "mail"]))
        .with_template(TemplateConfig::new("(cn=)", 0, 60))
        .with_template(TemplateConfig::new("(uidNumber>=)", 0, 60))
        .with_template(TemplateConfig::new("(&(objectClass=)(sn=))", 0, 120))
        .with_template(TemplateConfig::new("(mail=)", 0, 60).with_negative_ttl(10))
        .with_template(TemplateConfig::new("(cn=)", 1, 60))
        .with_template(TemplateConfig::new("(uidNumber<=)", 0, 60))
        .with_template(TemplateConfig::new("(|(cn=)(sn=))", 0, 60))
        .with_template(TemplateConfig::new("(!(cn=))", 0, 60))
        .with_sweep_period_secs(5)
}
