//! Tests for M6: End-to-end repository scenarios
//! Covers TC-6.1, TC-6.2, TC-6.3, TC-6.4, TC-6.5
//!
//! Run individual tests with:
//! cargo test tc_6_1 -- --nocapture
//! cargo test m6_end_to_end -- --nocapture

use lumbung::{
    named, AccessMode, KeyQuery, Order, Record, RepoBuilder, RepoConfig, RepoError, Repository, SchemaBuilder,
    Value,
};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
struct Person {
    id: i64,
    first_name: String,
    last_name: String,
    age: i32,
}

impl Person {
    fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Record for Person {
    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema
            .field_ro("id", |p| &p.id)
            .field("firstName", |p| &p.first_name, |p| &mut p.first_name)
            .field("lastName", |p| &p.last_name, |p| &mut p.last_name)
            .field("age", |p| &p.age, |p| &mut p.age)
            .property("fullName", Person::full_name, None);
    }
}

fn person(id: i64, first: &str, last: &str, age: i32) -> Person {
    Person {
        id,
        first_name: first.into(),
        last_name: last.into(),
        age,
    }
}

fn ids(records: &[Arc<Person>]) -> Vec<i64> {
    let mut out: Vec<i64> = records.iter().map(|p| p.id).collect();
    out.sort_unstable();
    out
}

mod tc_6_1_case_insensitive_surnames {
    use super::*;

    fn setup() -> Repository<Person> {
        println!("\n=== Building people repository ===");
        let mut repo = RepoBuilder::new()
            .primary_key("id")
            .unique_lookup_index("id")
            .search_index("lastName")
            .lower_case_index("lastName")
            .build()
            .unwrap();
        repo.add(person(1, "Ann", "Smith", 30)).unwrap();
        repo.add(person(2, "Bob", "smith", 40)).unwrap();
        repo
    }

    #[test]
    fn test_range_matches_both_spellings() {
        let repo = setup();
        let lo = repo.index_key("lastName", "S").unwrap();
        let hi = repo.index_key("lastName", "T").unwrap();
        let hits = repo.query_by_index("lastName", KeyQuery::Between(lo, hi)).unwrap();
        println!("   S..T matched {} people", hits.len());
        assert_eq!(ids(&hits), vec![1, 2]);
    }

    #[test]
    fn test_removed_record_is_unreachable() {
        let mut repo = setup();
        let removed = repo.remove(1).unwrap();
        assert_eq!(removed.first_name, "Ann");

        let lo = repo.index_key("lastName", "S").unwrap();
        let hi = repo.index_key("lastName", "T").unwrap();
        let hits = repo.query_by_index("lastName", KeyQuery::Between(lo, hi)).unwrap();
        assert_eq!(ids(&hits), vec![2]);
        assert!(repo.get(1).is_none());
        assert_eq!(repo.get(2).unwrap().last_name, "smith");
        assert!(repo.query_by_index("id", KeyQuery::Eq(Value::Int(1))).unwrap().is_empty());
    }

    #[test]
    fn test_lookup_on_primary_is_folded() {
        let repo = setup();
        assert_eq!(repo.index_names(), vec!["id", "lastName"]);
    }
}

mod tc_6_2_config_file {
    use super::*;

    const CONFIG: &str = r#"{
        "access": "direct",
        "property_access": true,
        "cache": true,
        "clone_edits": true,
        "null_checks": true,
        "events": true,
        "remove_duplication": true,
        "bucket_size": 8
    }"#;

    #[test]
    fn test_repository_from_json_config() {
        let config = RepoConfig::from_json(CONFIG).unwrap();
        let mut repo: Repository<Person> = RepoBuilder::new()
            .config(config)
            .primary_key("id")
            .search_index("age")
            .search_index("fullName")
            .build()
            .unwrap();

        assert_eq!(repo.config().access, AccessMode::Direct);
        assert_eq!(repo.stage_names(), vec!["validate", "clone", "cache", "events"]);

        repo.add_all([person(1, "Ann", "Smith", 30), person(2, "Citra", "Lestari", 25)])
            .unwrap();
        let by_full = repo
            .query_by_index("fullName", KeyQuery::Eq(Value::from("Citra Lestari")))
            .unwrap();
        assert_eq!(ids(&by_full), vec![2]);

        let adults = repo.query(named("over-26", |p: &Person| p.age > 26));
        assert_eq!(ids(&adults), vec![1]);
    }

    #[test]
    fn test_builder_toggles_override_config() {
        let config = RepoConfig::from_json(r#"{"cache": true}"#).unwrap();
        let repo: Repository<Person> = RepoBuilder::new()
            .config(config)
            .use_cache(false)
            .events(true)
            .primary_key("id")
            .build()
            .unwrap();
        assert_eq!(repo.stage_names(), vec!["events"]);
    }

    #[test]
    fn test_invalid_config_json() {
        let err = RepoConfig::from_json(r#"{"access": 7}"#).unwrap_err();
        assert!(matches!(err, RepoError::Configuration(_)));
    }
}

mod tc_6_3_configuration_errors {
    use super::*;

    fn fails(builder: RepoBuilder<Person>) {
        match builder.build() {
            Err(RepoError::Configuration(msg)) => println!("   rejected: {msg}"),
            Err(other) => panic!("expected a configuration error, got {other}"),
            Ok(_) => panic!("expected a configuration error"),
        }
    }

    #[test]
    fn test_rejected_builders() {
        fails(RepoBuilder::new());
        fails(RepoBuilder::new().primary_key("nickname"));
        fails(RepoBuilder::new().primary_key("id").search_index("height"));
        fails(RepoBuilder::new().primary_key("id").search_index("id"));
        fails(RepoBuilder::new().primary_key("id").search_index("age").lookup_index("age"));
        fails(RepoBuilder::new().primary_key("id").bucket_size("age", 4));
        fails(RepoBuilder::new().primary_key("id").collate("_type", |a, b| a.cmp(b)));
    }

    #[test]
    fn test_index_without_attribute_uses_key_getter() {
        let repo: Repository<Person> = RepoBuilder::new()
            .primary_key("id")
            .search_index("initials")
            .key_getter("initials", |p: &Person| {
                let first = p.first_name.chars().next().unwrap_or(' ');
                let last = p.last_name.chars().next().unwrap_or(' ');
                Value::from(format!("{first}{last}"))
            })
            .build()
            .unwrap();
        assert_eq!(repo.index_names(), vec!["id", "initials"]);
    }
}

mod tc_6_4_documents_and_bulk {
    use super::*;

    #[test]
    fn test_patch_through_document() {
        let mut repo: Repository<Person> = RepoBuilder::new()
            .primary_key("id")
            .search_index("age")
            .build()
            .unwrap();
        repo.add(person(1, "Ann", "Smith", 30)).unwrap();

        let patch = serde_json::json!({"age": "31", "lastName": "Smythe", "fullName": "ignored"});
        repo.apply_document(1, patch.as_object().unwrap()).unwrap();

        let ann = repo.get(1).unwrap();
        assert_eq!((ann.age, ann.last_name.as_str()), (31, "Smythe"));
        assert!(repo.query_by_index("age", KeyQuery::Eq(Value::Int(30))).unwrap().is_empty());

        let docs = repo.to_documents();
        assert_eq!(docs[0]["fullName"], serde_json::json!("Ann Smythe"));
    }

    #[test]
    fn test_bulk_add_stops_at_first_failure() {
        let mut repo: Repository<Person> = RepoBuilder::new().primary_key("id").build().unwrap();
        let batch = [
            person(1, "A", "A", 1),
            person(2, "B", "B", 2),
            person(1, "C", "C", 3),
            person(4, "D", "D", 4),
        ];
        assert!(repo.add_all(batch).is_err());
        assert_eq!(repo.len(), 2);
        assert!(!repo.contains(4));
    }

    #[test]
    fn test_large_load_keeps_order() {
        let mut repo: Repository<Person> = RepoBuilder::new()
            .primary_key("id")
            .search_index("age")
            .default_bucket_size(16)
            .build()
            .unwrap();
        let added = repo
            .add_all((0..2_000).map(|i| person(i, "N", "N", ((i * 7919) % 97) as i32)))
            .unwrap();
        assert_eq!(added, 2_000);

        let ages: Vec<i32> = repo
            .query_by_index("age", KeyQuery::All(Order::Ascending))
            .unwrap()
            .iter()
            .map(|p| p.age)
            .collect();
        assert_eq!(ages.len(), 2_000);
        assert!(ages.windows(2).all(|w| w[0] <= w[1]));

        let young = repo.query_by_index("age", KeyQuery::Lt(Value::Int(10))).unwrap();
        assert_eq!(young.len(), repo.query(|p: &Person| p.age < 10).len());
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Product {
    code: String,
    stock: i32,
}

impl Record for Product {
    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema
            .field_ro("code", |p| &p.code)
            .field("stock", |p| &p.stock, |p| &mut p.stock);
    }
}

mod tc_6_5_transformed_primary_key {
    use super::*;

    fn setup() -> Repository<Product> {
        let mut repo = RepoBuilder::new()
            .primary_key("code")
            .upper_case_index("code")
            .search_index("stock")
            .build()
            .unwrap();
        repo.add(Product { code: "ab-1".into(), stock: 3 }).unwrap();
        repo
    }

    #[test]
    fn test_raw_key_reaches_record() {
        let repo = setup();
        for key in ["ab-1", "AB-1", "Ab-1"] {
            assert!(repo.contains(key), "{key}");
            assert_eq!(repo.get(key).unwrap().code, "ab-1");
        }
        assert!(repo.get("ab-2").is_none());
    }

    #[test]
    fn test_edits_by_raw_key() {
        let mut repo = setup();
        repo.set_attribute("ab-1", "stock", 9).unwrap();
        assert_eq!(repo.get("AB-1").unwrap().stock, 9);

        let patch = serde_json::json!({"stock": 4});
        repo.apply_document("ab-1", patch.as_object().unwrap()).unwrap();
        assert_eq!(repo.get("ab-1").unwrap().stock, 4);

        let removed = repo.remove("ab-1").unwrap();
        assert_eq!(removed.stock, 4);
        assert!(repo.is_empty());
        assert!(repo.query_by_index("stock", KeyQuery::Eq(Value::Int(4))).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_after_transform() {
        let mut repo = setup();
        let err = repo.add(Product { code: "AB-1".into(), stock: 1 }).unwrap_err();
        assert!(matches!(err, RepoError::DuplicateKey { .. }));
    }
}
