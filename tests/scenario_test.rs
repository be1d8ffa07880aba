use std::sync::{Arc, Mutex};

use bevy_marker::*;

#[test]
fn test_create_lookup_delete() {
    let mut holder = TagHolder::new("H");
    let alpha = holder.add_marker("Alpha", Rgba::RED).unwrap();
    let beta = holder.add_marker("Beta", Rgba::BLUE).unwrap();
    assert_eq!((alpha, beta), (1, 2));

    let mut db = TagDatabase::new();
    db.rebuild([holder]).unwrap();

    let (marker, owner) = db.find(2).unwrap();
    assert_eq!(marker.name(), "Beta");
    assert_eq!(owner.name(), "H");
    assert_eq!(db.find_by_name("Beta", "H").map(Marker::id), Some(beta));

    assert!(db.remove_marker(beta));
    assert!(db.find(2).is_none());
    assert!(db.find_by_name("Beta", "H").is_none());
}

#[test]
fn test_value_group_validity() {
    let mut world = FlagHolder::new("World");
    let flag_a = world.add_marker("FlagA", true).unwrap();
    let flag_b = world.add_marker("FlagB", false).unwrap();

    let mut db = FlagDatabase::new();
    db.rebuild([world]).unwrap();

    let mut gate = ValueGroup::new().with(flag_a, true).with(flag_b, false);
    assert!(gate.all_valid(&db));

    db.set_value(flag_b, true);
    assert!(!gate.all_valid(&db));
}

#[test]
fn test_dangling_reference_reads_absent() {
    let mut holder = TagHolder::new("Palette");
    let enemy = holder.add_marker("Enemy", Rgba::RED).unwrap();
    let mut db = TagDatabase::new();
    db.rebuild([holder]).unwrap();

    let mut reference = TagRef::new(enemy);
    assert_eq!(reference.resolve(&db).map(Marker::id), Some(enemy));

    db.remove_marker(enemy);
    assert!(reference.resolve(&db).is_none());
    assert_eq!(reference.state(), ReferenceState::Dangling);
}

#[test]
fn test_reference_survives_move_between_holders() {
    let mut units = TagHolder::new("Units");
    let enemy = units.add_marker("Enemy", Rgba::RED).unwrap();
    let items = TagHolder::new("Items");

    let mut db = TagDatabase::new();
    db.rebuild([units, items]).unwrap();
    let items_id = db.holder_by_name("Items").unwrap().id();

    let mut reference = db.reference(enemy).unwrap();
    assert!(db.move_marker(enemy, items_id));

    let marker = reference.resolve(&db).unwrap();
    assert_eq!(marker.holder(), items_id);
    assert_eq!(marker.name(), "Enemy");
}

#[test]
fn test_tag_names_are_unique_across_holders() {
    let units = TagHolder::new("Units");
    let items = TagHolder::new("Items");
    let mut db = TagDatabase::new();
    db.rebuild([units, items]).unwrap();
    let units_id = db.holder_by_name("Units").unwrap().id();
    let items_id = db.holder_by_name("Items").unwrap().id();

    let enemy = db.add_marker(units_id, "Enemy", Rgba::RED).unwrap();
    assert_eq!(db.add_marker(units_id, "Enemy", Rgba::BLUE).unwrap(), enemy);
    assert!(matches!(
        db.add_marker(items_id, "Enemy", Rgba::RED),
        Err(RegistryError::DuplicateName { .. })
    ));
}

#[test]
fn test_flag_names_are_scoped_per_holder() {
    let world = FlagHolder::new("World");
    let level = FlagHolder::new("Level");
    let mut db = FlagDatabase::new();
    db.rebuild([world, level]).unwrap();
    let world_id = db.holder_by_name("World").unwrap().id();
    let level_id = db.holder_by_name("Level").unwrap().id();

    let a = db.add_marker(world_id, "Started", false).unwrap();
    let b = db.add_marker(level_id, "Started", true).unwrap();
    assert_ne!(a, b);
    assert!(db.value(b));
    assert!(!db.value(a));
}

#[test]
fn test_observers_see_each_transition_once() {
    let mut world = FlagHolder::new("World");
    let door = world.add_marker("DoorOpen", false).unwrap();
    let mut db = FlagDatabase::new();
    db.rebuild([world]).unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    db.register_fn(move |change| {
        sink.lock()
            .unwrap()
            .push(format!("{}.{}={}", change.holder_name, change.name, change.value));
    });

    assert!(db.set_value(door, true));
    assert!(!db.set_value(door, true));
    assert_eq!(db.reset_all(), 1);

    assert_eq!(
        *seen.lock().unwrap(),
        ["World.DoorOpen=true", "World.DoorOpen=false"]
    );
}

#[test]
fn test_independently_authored_holders_are_repaired() {
    let mut units = TagHolder::new("Units");
    units.add_marker("Enemy", Rgba::RED).unwrap();
    let mut items = TagHolder::new("Items");
    items.add_marker("Potion", Rgba::BLUE).unwrap();

    let mut db = TagDatabase::new();
    let err = db.rebuild([units, items]).unwrap_err();
    let RegistryError::DuplicateIds(collisions) = &err else {
        panic!("expected duplicate ids, got {err:?}");
    };
    assert_eq!(collisions.len(), 1);
    assert_eq!(collisions[0].id, 1);

    let repaired = db.repair_duplicate_ids();
    assert_eq!(repaired.len(), 1);
    assert!(db.validate().is_ok());

    let potion = db.find_named("Potion").unwrap();
    assert_eq!(repaired[0].reassigned, Some(potion.id()));
    assert_ne!(potion.id(), db.find_named("Enemy").unwrap().id());
}
