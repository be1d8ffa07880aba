use bevy_marker::*;

#[test]
fn test_holder_round_trip_keeps_ids_and_counter() {
    let mut palette = TagHolder::new("Palette");
    let alpha = palette.add_marker("Alpha", Rgba::RED).unwrap();
    let beta = palette.add_marker("Beta", Rgba::from_hex(0x3366_99ff)).unwrap();
    palette.remove_marker(alpha);

    let json = serde_json::to_string(&palette).unwrap();
    let mut restored: TagHolder = serde_json::from_str(&json).unwrap();

    assert_eq!(restored.name(), "Palette");
    assert_ne!(restored.id(), palette.id());
    assert_eq!(restored.ids().collect::<Vec<_>>(), [beta]);
    assert_eq!(restored.next_id(), palette.next_id());

    let marker = restored.find_by_id(beta).unwrap();
    assert_eq!(marker.holder(), restored.id());
    assert_eq!(marker.color().to_hex(), 0x3366_99ff);

    // The removed id is not handed out again
    assert_eq!(restored.add_marker("Gamma", Rgba::GREEN).unwrap(), 3);
}

#[test]
fn test_metadata_is_persisted() {
    let mut world = FlagHolder::new("World");
    let door = world.add_marker("DoorOpen", true).unwrap();
    world.marker_mut(door).unwrap().set_meta("weight", &42u32);

    let json = serde_json::to_string(&world).unwrap();
    let restored: FlagHolder = serde_json::from_str(&json).unwrap();

    let marker = restored.find_by_id(door).unwrap();
    assert!(marker.value());
    assert_eq!(marker.get_meta::<u32>("weight"), Some(42));
}

#[test]
fn test_legacy_holder_without_counter() {
    // Older data carries no counter; it is recovered from the highest id
    let json = r#"{"name":"World","markers":[{"id":7,"name":"Started","data":true}]}"#;
    let mut world: FlagHolder = serde_json::from_str(json).unwrap();

    assert_eq!(world.next_id(), 8);
    assert_eq!(world.add_marker("DoorOpen", false).unwrap(), 8);
}

#[test]
fn test_references_and_groups_serialize_as_ids() {
    let reference = TagRef::new(5);
    assert_eq!(serde_json::to_string(&reference).unwrap(), "5");
    let restored: TagRef = serde_json::from_str("5").unwrap();
    assert_eq!(restored.id(), 5);
    assert_eq!(restored.state(), ReferenceState::Unresolved);

    let group: TagGroup = [3, 1].into_iter().collect();
    assert_eq!(serde_json::to_string(&group).unwrap(), "[3,1]");

    let gate = ValueGroup::new().with(2, true);
    let json = serde_json::to_string(&gate).unwrap();
    let restored: ValueGroup = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, gate);
}

#[test]
fn test_stored_groups_are_deduplicated() {
    let mut group: TagGroup = serde_json::from_str("[3,3,0,1]").unwrap();
    assert_eq!(group.ids().collect::<Vec<_>>(), [3, 1]);
    assert_eq!(group.len(), 2);

    assert!(group.remove(3));
    assert!(!group.contains(3));

    let json = r#"[{"flag":2,"required":true},{"flag":2,"required":false},{"flag":0,"required":true}]"#;
    let gate: ValueGroup = serde_json::from_str(json).unwrap();
    assert_eq!(gate, ValueGroup::new().with(2, true));
}

#[test]
fn test_stored_holder_with_reserved_id_is_rejected() {
    let json = r#"{"name":"World","markers":[{"id":0,"name":"Started","data":true}]}"#;
    let err = serde_json::from_str::<FlagHolder>(json).unwrap_err();
    assert!(err.to_string().contains("invalid definition"), "{err}");
}

#[test]
fn test_stored_holder_with_clashing_names_fails_validation() {
    let json = r#"{"name":"World","markers":[
        {"id":1,"name":"Dup","data":false},
        {"id":2,"name":"Dup","data":true}
    ]}"#;
    let world: FlagHolder = serde_json::from_str(json).unwrap();

    let mut db = FlagDatabase::new();
    let err = db.rebuild([world]).unwrap_err();
    let RegistryError::DuplicateNames(names) = &err else {
        panic!("expected duplicate names, got {err:?}");
    };
    assert_eq!(names[0].name, "Dup");
}
