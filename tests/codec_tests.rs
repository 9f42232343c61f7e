#![allow(missing_docs)]

use satchel::codec::{HEADER_SIZE, MAGIC_BYTES};
use satchel::{Base64, BinaryCodec, Encoded, EntitySet, JsonCodec, Persist, Satchel, Vec3};
use std::fs;

#[derive(Debug, Default, Clone, PartialEq, Persist)]
#[persist(file = "world")]
struct Marker {
    #[persist(id)]
    id: String,
    #[persist]
    label: String,
    #[persist]
    at: Vec3,
    #[persist]
    tags: Vec<String>,
    #[persist]
    weight: f64,
}

fn marker(id: &str) -> Marker {
    Marker {
        id: id.into(),
        label: "camp".into(),
        at: Vec3::new(1.5, -2.0, 8.25),
        tags: vec!["safe".into(), "water".into()],
        weight: 0.125,
    }
}

fn round_trip(satchel: &Satchel) -> Marker {
    let mut world = EntitySet::new();
    world.insert(marker("m"));
    satchel.save_all(&mut world).unwrap();

    let mut restored = EntitySet::new();
    restored.insert(Marker { id: "m".into(), ..Marker::default() });
    assert_eq!(satchel.load_all(&mut restored).unwrap().restored, 1);
    restored.get::<Marker>("m").unwrap().clone()
}

#[test]
fn binary_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let satchel = Satchel::builder().save_dir(dir.path()).codec(BinaryCodec).build().unwrap();
    assert_eq!(round_trip(&satchel), marker("m"));

    let bytes = fs::read(dir.path().join("world.sav")).unwrap();
    assert_eq!(bytes[..4], MAGIC_BYTES);
    assert!(bytes.len() > HEADER_SIZE);
}

#[test]
fn corrupt_binary_save_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let satchel = Satchel::builder().save_dir(dir.path()).codec(BinaryCodec).build().unwrap();
    let mut world = EntitySet::new();
    world.insert(marker("m"));
    satchel.save_all(&mut world).unwrap();

    let path = dir.path().join("world.sav");
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    fs::write(&path, bytes).unwrap();

    let mut restored = EntitySet::new();
    restored.insert(Marker { id: "m".into(), ..Marker::default() });
    assert_eq!(satchel.load_all(&mut restored).unwrap().documents, 0);
    assert_eq!(restored.get::<Marker>("m").unwrap().label, "");
}

#[test]
fn base64_wrapped_json() {
    let dir = tempfile::tempdir().unwrap();
    let satchel = Satchel::builder()
        .save_dir(dir.path())
        .codec(Encoded::new(JsonCodec::compact(), Base64))
        .build()
        .unwrap();
    assert_eq!(round_trip(&satchel), marker("m"));

    let text = fs::read_to_string(dir.path().join("world.json.b64")).unwrap();
    assert!(!text.contains("camp"));
    assert!(satchel.has_save());
}

#[test]
fn codecs_do_not_see_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let json = Satchel::builder().save_dir(dir.path()).build().unwrap();
    let binary = Satchel::builder().save_dir(dir.path()).codec(BinaryCodec).build().unwrap();

    let mut world = EntitySet::new();
    world.insert(marker("m"));
    binary.save_all(&mut world).unwrap();
    assert!(binary.has_save());
    assert!(!json.has_save());
    assert_eq!(json.clean_all_saves().unwrap(), 0);
}

#[derive(Debug, Default, Persist)]
#[persist(file = "gauges")]
struct Gauge {
    #[persist(id)]
    id: String,
    #[persist]
    hp: i64,
    #[persist]
    cooldown: f32,
    #[persist]
    drift: f64,
    #[persist]
    floor: f64,
}

#[test]
fn json_keeps_non_finite_floats() {
    let dir = tempfile::tempdir().unwrap();
    let satchel = Satchel::builder().save_dir(dir.path()).build().unwrap();
    let mut world = EntitySet::new();
    world.insert(Gauge {
        id: "g".into(),
        hp: 42,
        cooldown: f32::INFINITY,
        drift: f64::NAN,
        floor: f64::NEG_INFINITY,
    });
    satchel.save_all(&mut world).unwrap();
    assert!(!fs::read_to_string(dir.path().join("gauges.json")).unwrap().contains("null"));

    let mut restored = EntitySet::new();
    restored.insert(Gauge { id: "g".into(), ..Gauge::default() });
    let report = satchel.load_all(&mut restored).unwrap();
    assert_eq!(report.documents, 1);
    assert_eq!(report.restored, 1);

    let gauge = restored.get::<Gauge>("g").unwrap();
    assert_eq!(gauge.hp, 42);
    assert_eq!(gauge.cooldown, f32::INFINITY);
    assert!(gauge.drift.is_nan());
    assert_eq!(gauge.floor, f64::NEG_INFINITY);
}

#[test]
fn compact_option_picks_compact_json() {
    let dir = tempfile::tempdir().unwrap();
    let options = satchel::Options {
        pretty: false,
        ..satchel::Options::at(dir.path())
    };
    let satchel = Satchel::builder().options(options).build().unwrap();
    round_trip(&satchel);
    let text = fs::read_to_string(dir.path().join("world.json")).unwrap();
    assert!(!text.contains('\n'));
}

#[cfg(feature = "lz4")]
#[test]
fn lz4_wrapped_binary() {
    let dir = tempfile::tempdir().unwrap();
    let satchel = Satchel::builder()
        .save_dir(dir.path())
        .codec(Encoded::new(BinaryCodec, satchel::Lz4))
        .build()
        .unwrap();
    assert_eq!(round_trip(&satchel), marker("m"));
    assert!(dir.path().join("world.sav.lz4").exists());
}
