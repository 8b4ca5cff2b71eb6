//! Tests for M1: Attribute Accessors
//! Covers TC-1.1, TC-1.2, TC-1.3, TC-1.4
//!
//! Run individual tests with:
//! cargo test tc_1_1 -- --nocapture
//! cargo test m1_accessors -- --nocapture

use bytemuck::{Pod, Zeroable};
use lumbung::{AccessMode, Record, RepoError, Schema, SchemaBuilder, Value, ValueType};
use proptest::prelude::*;
use std::mem::offset_of;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
struct Sensor {
    id: i64,
    reading: f64,
    count: i32,
    ratio: f32,
    seq: u32,
    level: i16,
    flag: u8,
    kind: i8,
}

impl Record for Sensor {
    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema
            .offset::<i64>("id", offset_of!(Sensor, id))
            .offset::<f64>("reading", offset_of!(Sensor, reading))
            .offset::<i32>("count", offset_of!(Sensor, count))
            .offset::<f32>("ratio", offset_of!(Sensor, ratio))
            .offset::<u32>("seq", offset_of!(Sensor, seq))
            .offset::<i16>("level", offset_of!(Sensor, level))
            .offset::<u8>("flag", offset_of!(Sensor, flag))
            .offset::<i8>("kind", offset_of!(Sensor, kind))
            .volatile("count");
    }
}

const SENSOR_ATTRS: [&str; 8] = ["id", "reading", "count", "ratio", "seq", "level", "flag", "kind"];

#[derive(Clone, Debug, Default)]
struct Profile {
    handle: String,
    active: bool,
    grade: char,
    nickname: Option<String>,
    karma: u16,
}

impl Profile {
    fn display(&self) -> String {
        format!("@{}", self.handle)
    }

    fn set_display(&mut self, v: String) {
        self.handle = v.trim_start_matches('@').to_string();
    }
}

impl Record for Profile {
    fn describe(schema: &mut SchemaBuilder<Self>) {
        schema
            .field("handle", |p| &p.handle, |p| &mut p.handle)
            .field("active", |p| &p.active, |p| &mut p.active)
            .field("grade", |p| &p.grade, |p| &mut p.grade)
            .field("nickname", |p| &p.nickname, |p| &mut p.nickname)
            .field("karma", |p| &p.karma, |p| &mut p.karma)
            .property("display", Profile::display, Some(Profile::set_display))
            .shared("table", ValueType::Text, || Value::from("profiles"));
    }
}

const PROFILE_ATTRS: [&str; 6] = ["handle", "active", "grade", "nickname", "karma", "display"];

fn bits(v: &Value) -> Value {
    match v {
        Value::Float(f) => Value::Int(f.to_bits() as i64),
        other => other.clone(),
    }
}

fn assert_backends_agree<R: Record>(record: &R, names: &[&str]) {
    let schema = Schema::<R>::of().unwrap();
    for name in names {
        let direct = schema.accessor(name, AccessMode::Direct, false).unwrap();
        let reflective = schema.accessor(name, AccessMode::Reflective, false).unwrap();
        assert_eq!(bits(&direct.get(record)), bits(&reflective.get(record)), "attribute {name}");
        assert_eq!(direct.descriptor(), reflective.descriptor(), "descriptor {name}");
    }
}

mod tc_1_1_backend_equivalence {
    use super::*;

    #[test]
    fn test_offset_and_reflective_agree() {
        let s = Sensor {
            id: -7,
            reading: 98.6,
            count: 3,
            ratio: 0.25,
            seq: u32::MAX,
            level: -2,
            flag: 255,
            kind: -128,
        };
        assert_backends_agree(&s, &SENSOR_ATTRS);
    }

    #[test]
    fn test_field_lens_and_reflective_agree() {
        let p = Profile {
            handle: "ana".into(),
            active: true,
            grade: 'A',
            nickname: None,
            karma: 512,
        };
        assert_backends_agree(&p, &PROFILE_ATTRS);
    }

    proptest! {
        #[test]
        fn prop_backends_agree_for_any_sensor(
            id in any::<i64>(),
            reading in any::<f64>(),
            count in any::<i32>(),
            ratio in any::<f32>(),
            seq in any::<u32>(),
            level in any::<i16>(),
            flag in any::<u8>(),
            kind in any::<i8>(),
        ) {
            let s = Sensor { id, reading, count, ratio, seq, level, flag, kind };
            assert_backends_agree(&s, &SENSOR_ATTRS);
        }

        #[test]
        fn prop_direct_write_reads_back_reflectively(count in any::<i32>(), reading in any::<f64>()) {
            let schema = Schema::<Sensor>::of().unwrap();
            let mut s = Sensor::default();
            schema.accessor("count", AccessMode::Direct, false).unwrap().set(&mut s, Value::from(count)).unwrap();
            schema.accessor("reading", AccessMode::Direct, false).unwrap().set(&mut s, Value::from(reading)).unwrap();
            let reflective = |n: &str| schema.accessor(n, AccessMode::Reflective, false).unwrap().get(&s);
            prop_assert_eq!(reflective("count"), Value::Int(count as i64));
            prop_assert_eq!(bits(&reflective("reading")), bits(&Value::Float(reading)));
        }
    }
}

mod tc_1_2_coercion {
    use super::*;

    #[test]
    fn test_text_and_boxed_numbers_are_coerced() {
        let schema = Schema::<Sensor>::of().unwrap();
        let mut s = Sensor::default();
        for mode in [AccessMode::Direct, AccessMode::Reflective] {
            schema.accessor("level", mode, false).unwrap().set(&mut s, Value::from(" 12 ")).unwrap();
            assert_eq!(s.level, 12);
            schema.accessor("reading", mode, false).unwrap().set(&mut s, Value::Int(3)).unwrap();
            assert_eq!(s.reading, 3.0);
            schema.accessor("count", mode, false).unwrap().set(&mut s, Value::Float(4.0)).unwrap();
            assert_eq!(s.count, 4);
        }
    }

    #[test]
    fn test_out_of_range_and_garbage_fail() {
        let schema = Schema::<Sensor>::of().unwrap();
        let mut s = Sensor::default();
        let level = schema.accessor("level", AccessMode::Direct, false).unwrap();
        assert!(matches!(level.set(&mut s, Value::Int(70_000)), Err(RepoError::Coercion { .. })));
        assert!(matches!(level.set(&mut s, Value::from("twelve")), Err(RepoError::Coercion { .. })));
        assert!(matches!(level.set(&mut s, Value::Float(1.5)), Err(RepoError::Coercion { .. })));
        assert_eq!(s.level, 0, "failed sets leave the record untouched");
    }

    #[test]
    fn test_char_bool_and_nullable() {
        let schema = Schema::<Profile>::of().unwrap();
        let mut p = Profile::default();
        for mode in [AccessMode::Direct, AccessMode::Reflective] {
            schema.accessor("grade", mode, false).unwrap().set(&mut p, Value::from("B")).unwrap();
            schema.accessor("active", mode, false).unwrap().set(&mut p, Value::from("yes")).unwrap();
            schema.accessor("nickname", mode, false).unwrap().set(&mut p, Value::from("nana")).unwrap();
            assert_eq!((p.grade, p.active, p.nickname.as_deref()), ('B', true, Some("nana")));
            schema.accessor("nickname", mode, false).unwrap().set(&mut p, Value::Null).unwrap();
            assert_eq!(p.nickname, None);
        }
        let handle = schema.accessor("handle", AccessMode::Reflective, false).unwrap();
        assert!(matches!(handle.set(&mut p, Value::Null), Err(RepoError::Coercion { .. })));
    }
}

mod tc_1_3_qualifiers {
    use super::*;

    #[test]
    fn test_static_attribute_ignores_record() {
        let schema = Schema::<Profile>::of().unwrap();
        let table = schema.accessor("table", AccessMode::Direct, false).unwrap();
        let d = table.descriptor();
        assert!(d.is_static && d.read_only);
        assert_eq!(table.get_static(), Some(Value::from("profiles")));
        assert_eq!(table.get(&Profile::default()), Value::from("profiles"));
        let mut p = Profile::default();
        assert!(matches!(table.set(&mut p, Value::from("x")), Err(RepoError::UnsupportedMutation { .. })));
    }

    #[test]
    fn test_volatile_is_reported_and_behaves() {
        let schema = Schema::<Sensor>::of().unwrap();
        assert!(schema.descriptor("count").unwrap().volatile);
        assert!(!schema.descriptor("id").unwrap().volatile);
        let mut s = Sensor::default();
        let count = schema.accessor("count", AccessMode::Direct, false).unwrap();
        count.set(&mut s, Value::Int(9)).unwrap();
        assert_eq!(count.get(&s), Value::Int(9));
    }

    #[test]
    fn test_declared_types() {
        let schema = Schema::<Sensor>::of().unwrap();
        let types: Vec<ValueType> = SENSOR_ATTRS.iter().map(|n| schema.descriptor(n).unwrap().ty).collect();
        assert_eq!(
            types,
            vec![
                ValueType::Long,
                ValueType::Double,
                ValueType::Int,
                ValueType::Float,
                ValueType::Long,
                ValueType::Short,
                ValueType::Short,
                ValueType::Byte,
            ]
        );
    }
}

mod tc_1_4_property_access {
    use super::*;

    #[test]
    fn test_property_getter_and_setter() {
        let schema = Schema::<Profile>::of().unwrap();
        let display = schema.accessor("display", AccessMode::Reflective, true).unwrap();
        let mut p = Profile { handle: "budi".into(), ..Default::default() };
        assert_eq!(display.get(&p), Value::from("@budi"));
        display.set(&mut p, Value::from("@citra")).unwrap();
        assert_eq!(p.handle, "citra");
    }
}
