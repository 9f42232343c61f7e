#![allow(missing_docs)]

use satchel::{EntitySet, ErrorCategory, Persist, Quat, Satchel, SatchelError, Vec3};
use serde_json::Value as Json;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

// --- MOCK DATA STRUCTURES ---

#[derive(Debug, Default, Clone, PartialEq, Persist)]
#[persist(nested)]
struct Stats {
    #[persist]
    level: u8,
    #[persist]
    xp: i64,
}

#[derive(Debug, Default, Clone, PartialEq, Persist)]
#[persist(file = "world")]
struct Hero {
    #[persist(id)]
    id: String,
    #[persist]
    hp: i64,
    #[persist]
    pos: Vec3,
    #[persist]
    facing: Quat,
    #[persist]
    inventory: Vec<String>,
    #[persist]
    stats: Stats,
    #[persist]
    party: Vec<Stats>,
    #[persist]
    waypoints: Vec<Vec3>,
    #[persist]
    alive: bool,
    #[persist]
    speed: f32,
    #[persist]
    initial: char,
    cache: Vec<u8>,
}

#[derive(Debug, Default, PartialEq, Persist)]
#[persist(file = "chests")]
struct Chest {
    #[persist(id)]
    id: String,
    #[persist]
    gold: i64,
    #[persist]
    opened: bool,
}

#[derive(Debug, Default, PartialEq, Persist)]
#[persist(file = "slot", explicit)]
struct Checkpoint {
    #[persist(id)]
    id: String,
    #[persist]
    label: String,
}

fn setup() -> (TempDir, Satchel) {
    let dir = tempfile::tempdir().unwrap();
    let satchel = Satchel::builder().save_dir(dir.path()).build().unwrap();
    (dir, satchel)
}

fn read_json(path: &Path) -> Json {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

fn full_hero(id: &str) -> Hero {
    Hero {
        id: id.into(),
        hp: 42,
        pos: Vec3::new(0.0, 1.0, 0.0),
        facing: Quat::IDENTITY,
        inventory: vec!["a".into(), "b".into()],
        stats: Stats { level: 7, xp: 1200 },
        party: vec![Stats { level: 1, xp: 0 }, Stats { level: 2, xp: 30 }],
        waypoints: vec![Vec3::new(1.0, 2.0, 3.0)],
        alive: true,
        speed: 2.5,
        initial: 'h',
        cache: vec![1, 2, 3],
    }
}

fn fresh(id: &str) -> Hero {
    Hero {
        id: id.into(),
        ..Hero::default()
    }
}

// --- TESTS ---

#[test]
fn hero_document_layout() {
    let (dir, satchel) = setup();
    let mut world = EntitySet::new();
    world.insert(full_hero("hero"));
    let report = satchel.save_all(&mut world).unwrap();
    assert_eq!(report.entities, 1);
    assert_eq!(report.files, [dir.path().join("world.json")]);

    let doc = read_json(&dir.path().join("world.json"));
    assert_eq!(doc["version"], 1);
    assert_eq!(doc["fileName"], "world");

    let hero = &doc["entities"][0];
    assert_eq!(hero["id"], "hero");
    let hp = hero["fields"].as_array().unwrap().iter().find(|f| f["name"] == "hp").unwrap();
    assert_eq!(hp["value"], 42);

    let pos = hero["nested"].as_array().unwrap().iter().find(|n| n["id"] == "pos").unwrap();
    let components: Vec<(&str, f64)> = pos["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| (f["name"].as_str().unwrap(), f["value"].as_f64().unwrap()))
        .collect();
    assert_eq!(components, [("X", 0.0), ("Y", 1.0), ("Z", 0.0)]);
}

#[test]
fn string_list_keeps_order() {
    let (dir, satchel) = setup();
    let mut world = EntitySet::new();
    world.insert(full_hero("hero"));
    satchel.save_all(&mut world).unwrap();

    let doc = read_json(&dir.path().join("world.json"));
    let inventory = doc["entities"][0]["nested"]
        .as_array()
        .unwrap()
        .iter()
        .find(|n| n["id"] == "inventory")
        .unwrap()
        .clone();
    let items = inventory["nested"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["id"], "0");
    assert_eq!(items[0]["fields"][0]["name"], "value");
    assert_eq!(items[0]["fields"][0]["value"], "a");
    assert_eq!(items[1]["id"], "1");
    assert_eq!(items[1]["fields"][0]["value"], "b");
}

#[test]
fn round_trip_restores_saved_fields() {
    let (_dir, satchel) = setup();
    let mut world = EntitySet::new();
    world.insert(full_hero("hero"));
    world.insert(Chest { id: "c1".into(), gold: 50, opened: true });
    let report = satchel.save_all(&mut world).unwrap();
    assert_eq!(report.files.len(), 2);
    assert!(report.files[0].ends_with("chests.json"));

    let mut restored = EntitySet::new();
    restored.insert(fresh("hero"));
    restored.insert(Chest { id: "c1".into(), ..Chest::default() });
    let loaded = satchel.load_all(&mut restored).unwrap();
    assert_eq!(loaded.documents, 2);
    assert_eq!(loaded.restored, 2);
    assert_eq!(loaded.unmatched, 0);

    let hero = restored.get::<Hero>("hero").unwrap();
    let expected = Hero {
        cache: Vec::new(),
        ..full_hero("hero")
    };
    assert_eq!(hero, &expected);
    assert_eq!(
        restored.get::<Chest>("c1").unwrap(),
        &Chest { id: "c1".into(), gold: 50, opened: true }
    );
}

#[test]
fn rotations_survive_as_euler_angles() {
    let (_dir, satchel) = setup();
    let facing = Quat::from_euler_degrees(Vec3::new(0.0, 0.0, 90.0));
    let mut world = EntitySet::new();
    world.insert(Hero {
        facing,
        ..fresh("hero")
    });
    satchel.save_all(&mut world).unwrap();

    let mut restored = EntitySet::new();
    restored.insert(fresh("hero"));
    satchel.load_all(&mut restored).unwrap();
    let back = restored.get::<Hero>("hero").unwrap().facing;
    for (a, b) in [(back.x, facing.x), (back.y, facing.y), (back.z, facing.z), (back.w, facing.w)] {
        assert!((a - b).abs() < 1e-4, "{back:?} != {facing:?}");
    }
}

#[test]
fn save_load_save_is_byte_identical() {
    let (dir, satchel) = setup();
    let path = dir.path().join("world.json");
    let mut world = EntitySet::new();
    world.insert(full_hero("hero"));
    world.insert(full_hero("sidekick"));
    satchel.save_all(&mut world).unwrap();
    let first = fs::read(&path).unwrap();

    let mut restored = EntitySet::new();
    restored.insert(fresh("hero"));
    restored.insert(fresh("sidekick"));
    satchel.load_all(&mut restored).unwrap();
    satchel.save_all(&mut restored).unwrap();
    assert_eq!(first, fs::read(&path).unwrap());
}

#[test]
fn older_documents_leave_new_fields_alone() {
    let (dir, satchel) = setup();
    // Written before `pos`, `stats` and friends existed.
    let old = r#"{
        "version": 1,
        "fileName": "world",
        "entities": [{ "id": "hero", "fields": [{ "name": "hp", "value": 7 }] }]
    }"#;
    fs::write(dir.path().join("world.json"), old).unwrap();

    let mut world = EntitySet::new();
    world.insert(Hero {
        pos: Vec3::new(5.0, 5.0, 5.0),
        inventory: vec!["kept".into()],
        ..fresh("hero")
    });
    let report = satchel.load_all(&mut world).unwrap();
    assert_eq!(report.restored, 1);

    let hero = world.get::<Hero>("hero").unwrap();
    assert_eq!(hero.hp, 7);
    assert_eq!(hero.pos, Vec3::new(5.0, 5.0, 5.0));
    assert_eq!(hero.inventory, ["kept"]);
}

#[test]
fn wrong_stored_shape_is_a_data_error() {
    let (dir, satchel) = setup();
    let bad = r#"{
        "version": 1,
        "fileName": "chests",
        "entities": [{ "id": "c", "fields": [{ "name": "gold", "value": "x" }] }]
    }"#;
    fs::write(dir.path().join("chests.json"), bad).unwrap();

    let mut world = EntitySet::new();
    world.insert(Chest { id: "c".into(), ..Chest::default() });
    let err = satchel.load_all(&mut world).unwrap_err();
    assert!(matches!(err, SatchelError::ValueMismatch { expected: "i64", found: "string" }));
    assert_eq!(err.category(), ErrorCategory::Data);
}

#[test]
fn missing_file_is_a_no_op() {
    let (_dir, satchel) = setup();
    let mut world = EntitySet::new();
    world.insert(full_hero("hero"));
    let report = satchel.load_all(&mut world).unwrap();
    assert_eq!(report, satchel::LoadReport::default());
    assert_eq!(world.get::<Hero>("hero").unwrap().hp, 42);
}

#[test]
fn unreadable_file_is_a_no_op() {
    let (dir, satchel) = setup();
    fs::write(dir.path().join("world.json"), b"{ not json").unwrap();
    let mut world = EntitySet::new();
    world.insert(full_hero("hero"));
    assert_eq!(satchel.load_all(&mut world).unwrap().documents, 0);
    assert_eq!(world.get::<Hero>("hero").unwrap().hp, 42);
}

#[test]
fn entities_without_a_record_are_untouched() {
    let (_dir, satchel) = setup();
    let mut world = EntitySet::new();
    world.insert(full_hero("a"));
    satchel.save_all(&mut world).unwrap();

    let mut restored = EntitySet::new();
    restored.insert(fresh("a"));
    restored.insert(Hero { hp: 3, ..fresh("b") });
    let report = satchel.load_all(&mut restored).unwrap();
    assert_eq!(report.restored, 1);
    assert_eq!(report.unmatched, 1);
    assert_eq!(restored.get::<Hero>("b").unwrap().hp, 3);
}

#[test]
fn explicit_entities_stay_out_of_bulk_saves() {
    let (dir, satchel) = setup();
    let mut world = EntitySet::new();
    world.insert(full_hero("hero"));
    world.insert(Checkpoint { id: "cp".into(), label: "gate".into() });

    satchel.save_all(&mut world).unwrap();
    assert!(!dir.path().join("explicits").exists());

    let report = satchel.save_explicit("slot", &mut world).unwrap();
    assert_eq!(report.entities, 1);
    assert_eq!(report.files, [dir.path().join("explicits").join("slot.json")]);

    let nothing = satchel.save_explicit("other", &mut world).unwrap();
    assert!(nothing.files.is_empty());
    assert!(!dir.path().join("explicits").join("other.json").exists());

    let mut restored = EntitySet::new();
    restored.insert(Checkpoint { id: "cp".into(), ..Checkpoint::default() });
    assert_eq!(satchel.load_all(&mut restored).unwrap().restored, 0);
    assert_eq!(satchel.load_explicit("slot", &mut restored).unwrap().restored, 1);
    assert_eq!(restored.get::<Checkpoint>("cp").unwrap().label, "gate");
}

#[test]
fn duplicate_identities_are_reported() {
    let (_dir, satchel) = setup();
    let mut world = EntitySet::new();
    world.insert(fresh("twin"));
    world.insert(Chest { id: "twin".into(), ..Chest::default() });
    world.insert(fresh("solo"));

    let collisions = satchel.check_duplicates(&mut world, None);
    assert_eq!(collisions.len(), 1);
    assert_eq!(collisions[0].identity, "twin");
    let members: Vec<(usize, &str)> = collisions[0]
        .entities
        .iter()
        .map(|m| (m.index, m.saved.as_ref().unwrap().file.as_str()))
        .collect();
    assert_eq!(members, [(0, "world"), (1, "chests")]);

    let only_solo = |id: &str| id == "solo";
    assert!(satchel.check_duplicates(&mut world, Some(&only_solo)).is_empty());
}

#[test]
fn failed_save_writes_nothing() {
    let (dir, satchel) = setup();
    let mut world = EntitySet::new();
    world.insert(Chest { id: "c".into(), ..Chest::default() });
    world.insert(fresh("twin"));
    world.insert(fresh("twin"));

    let err = satchel.save_all(&mut world).unwrap_err();
    assert!(matches!(err, SatchelError::DuplicateIdentity { .. }));
    assert!(!satchel.has_save());
    assert!(!dir.path().join("chests.json").exists());
}

#[test]
fn empty_identities_fail_until_generated() {
    let (_dir, satchel) = setup();
    let mut world = EntitySet::new();
    world.insert(Chest::default());

    let err = satchel.save_all(&mut world).unwrap_err();
    assert!(matches!(err, SatchelError::InvalidIdentity { .. }));

    assert_eq!(satchel.generate_missing_identities(&mut world), 1);
    assert_eq!(satchel.generate_missing_identities(&mut world), 0);
    satchel.save_all(&mut world).unwrap();
}

#[test]
fn entities_without_identity_are_skipped_on_load() {
    let (_dir, satchel) = setup();
    let mut world = EntitySet::new();
    world.insert(full_hero("hero"));
    world.insert(Chest { id: "c".into(), ..Chest::default() });
    satchel.save_all(&mut world).unwrap();

    let mut restored = EntitySet::new();
    restored.insert(Hero::default());
    restored.insert(fresh("hero"));
    restored.insert(Chest { id: "c".into(), ..Chest::default() });

    let report = satchel.load_all(&mut restored).unwrap();
    assert_eq!(report.documents, 2);
    assert_eq!(report.restored, 2);
    assert_eq!(report.unmatched, 1);
    assert_eq!(restored.get::<Hero>("hero").unwrap().hp, 42);
    assert_eq!(restored.get::<Hero>("").unwrap(), &Hero::default());
}

#[test]
fn clean_removes_bulk_and_explicit_saves() {
    let (dir, satchel) = setup();
    assert_eq!(satchel.clean_all_saves().unwrap(), 0);

    let mut world = EntitySet::new();
    world.insert(full_hero("hero"));
    world.insert(Chest { id: "c".into(), ..Chest::default() });
    world.insert(Checkpoint { id: "cp".into(), ..Checkpoint::default() });
    satchel.save_all(&mut world).unwrap();
    satchel.save_explicit("slot", &mut world).unwrap();
    assert!(satchel.has_save());

    assert_eq!(satchel.clean_all_saves().unwrap(), 3);
    assert!(!satchel.has_save());
    assert!(dir.path().join("explicits").exists());
}

#[test]
fn inspect_describes_a_save() {
    let (_dir, satchel) = setup();
    assert!(satchel.inspect("world", false).unwrap().is_none());

    let mut world = EntitySet::new();
    world.insert(full_hero("hero"));
    satchel.save_all(&mut world).unwrap();

    let report = satchel.inspect("world", false).unwrap().unwrap();
    assert_eq!(report.entity_count, 1);
    assert!(report.to_string().contains("hero | Fields:"));
    assert!(satchel.inspect("../world", false).is_err());
}
