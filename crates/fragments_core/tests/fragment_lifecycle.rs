use fragments_core::{
    Attributes, FragmentId, FragmentService, MemoryRecordStore, ModelSchema, ParentKey,
    RecordStore, Schema, SerializeOptions, StoreError, TransformError,
};
use serde_json::json;

fn service() -> FragmentService<MemoryRecordStore> {
    let schema = Schema::new().with_model(
        "person",
        ModelSchema::default().with_collection("addresses", "address"),
    );
    FragmentService::new(MemoryRecordStore::new(), schema).unwrap()
}

fn street(value: &str) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert("street".to_string(), json!(value));
    attributes
}

fn name(value: &str) -> Attributes {
    let mut attributes = Attributes::new();
    attributes.insert("name".to_string(), json!(value));
    attributes
}

fn loaded_person(service: &mut FragmentService<MemoryRecordStore>) -> ParentKey {
    let document = service
        .normalize_response(
            "person",
            &json!({
                "id": "1",
                "name": "John Doe",
                "addresses": [{ "street": "123 Main St", "city": "Springfield" }]
            }),
            None,
        )
        .unwrap();
    ParentKey::of(&document.parent)
}

fn positions(service: &FragmentService<MemoryRecordStore>, ids: &[&FragmentId]) -> Vec<usize> {
    ids.iter()
        .map(|id| service.store().fragment(id).unwrap().position())
        .collect()
}

#[test]
fn created_person_starts_with_empty_collection() {
    let mut service = service();
    let person = service
        .create_parent("person", Some("1"), name("John Doe"))
        .unwrap();

    let parent = service.store().parent(&person).unwrap();
    assert_eq!(parent.get("name"), Some(&json!("John Doe")));
    assert!(parent.relationship("addresses").is_empty());
    assert!(parent.is_new());
}

#[test]
fn create_parent_mints_id_when_missing() {
    let mut service = service();
    let person = service.create_parent("person", None, Attributes::new()).unwrap();
    assert!(!person.id.is_empty());
    assert!(!person.id.contains(':'));
}

#[test]
fn appended_fragments_get_ordered_ids_and_metadata() {
    let mut service = service();
    let person = service
        .create_parent("person", Some("1"), name("John Doe"))
        .unwrap();

    let first = service
        .append_fragment(&person, "addresses", street("First St"))
        .unwrap();
    let second = service
        .append_fragment(&person, "addresses", street("Second St"))
        .unwrap();

    assert_eq!(first.as_str(), "person:1:addresses:0");
    assert_eq!(second.as_str(), "person:1:addresses:1");

    let fragment = service.store().fragment(&first).unwrap();
    assert_eq!(fragment.get("street"), Some(&json!("First St")));
    assert_eq!(fragment.meta.position, 0);
    assert_eq!(fragment.meta.owner_type, "person");
    assert_eq!(fragment.meta.owner_id, "1");
    assert!(fragment.is_new());
}

#[test]
fn append_to_undeclared_collection_is_rejected() {
    let mut service = service();
    let person = service.create_parent("person", Some("1"), Attributes::new()).unwrap();

    let err = service
        .append_fragment(&person, "phones", Attributes::new())
        .unwrap_err();
    assert!(matches!(err, TransformError::UnknownCollection { .. }));
}

#[test]
fn removing_middle_fragment_keeps_positions_contiguous() {
    let mut service = service();
    let person = service.create_parent("person", Some("1"), name("John Doe")).unwrap();
    let first = service.append_fragment(&person, "addresses", street("First St")).unwrap();
    let second = service.append_fragment(&person, "addresses", street("Second St")).unwrap();
    let third = service.append_fragment(&person, "addresses", street("Third St")).unwrap();

    service.remove_fragment(&person, "addresses", &second).unwrap();

    let parent = service.store().parent(&person).unwrap();
    assert_eq!(parent.relationship("addresses"), &[first.clone(), third.clone()]);
    assert!(service.store().peek_fragment(&second).is_none());
    assert_eq!(positions(&service, &[&first, &third]), vec![0, 1]);

    // ids keep their creation position
    assert_eq!(third.as_str(), "person:1:addresses:2");
}

#[test]
fn removing_unlinked_fragment_is_rejected() {
    let mut service = service();
    let person = loaded_person(&mut service);
    let stranger = fragments_core::encode("person", "2", "addresses", 0, None);

    let err = service
        .remove_fragment(&person, "addresses", &stranger)
        .unwrap_err();
    assert!(matches!(err, TransformError::FragmentNotLinked { .. }));
}

#[test]
fn serialize_after_removal_trusts_live_positions() {
    let mut service = service();
    let person = service.create_parent("person", Some("1"), Attributes::new()).unwrap();
    service.append_fragment(&person, "addresses", street("First St")).unwrap();
    let second = service.append_fragment(&person, "addresses", street("Second St")).unwrap();
    service.append_fragment(&person, "addresses", street("Third St")).unwrap();

    service.remove_fragment(&person, "addresses", &second).unwrap();
    service.move_fragment(&person, "addresses", 1, 0).unwrap();

    let json = service.serialize(&person, SerializeOptions::default()).unwrap();
    assert_eq!(
        json["addresses"],
        json!([{ "street": "Third St" }, { "street": "First St" }])
    );
}

#[test]
fn move_fragment_rejects_out_of_range_index() {
    let mut service = service();
    let person = loaded_person(&mut service);

    let err = service.move_fragment(&person, "addresses", 0, 3).unwrap_err();
    assert!(matches!(
        err,
        TransformError::IndexOutOfRange { index: 3, len: 1, .. }
    ));
}

#[test]
fn sorted_fragments_follow_position() {
    let mut service = service();
    let person = service.create_parent("person", Some("1"), Attributes::new()).unwrap();
    let first = service.append_fragment(&person, "addresses", street("A")).unwrap();
    let second = service.append_fragment(&person, "addresses", street("B")).unwrap();
    service.move_fragment(&person, "addresses", 0, 1).unwrap();

    let sorted: Vec<&FragmentId> = service
        .sorted_fragments(&person, "addresses")
        .unwrap()
        .into_iter()
        .map(|fragment| fragment.id())
        .collect();
    assert_eq!(sorted, vec![&second, &first]);
}

#[test]
fn append_after_removal_collides_with_shifted_sibling() {
    let mut service = service();
    let person = service.create_parent("person", Some("1"), Attributes::new()).unwrap();
    service.append_fragment(&person, "addresses", street("A")).unwrap();
    let second = service.append_fragment(&person, "addresses", street("B")).unwrap();
    service.append_fragment(&person, "addresses", street("C")).unwrap();
    service.remove_fragment(&person, "addresses", &second).unwrap();

    let err = service
        .append_fragment(&person, "addresses", street("D"))
        .unwrap_err();
    assert!(matches!(
        err,
        TransformError::Store(StoreError::DuplicateFragment(ref id))
            if id.as_str() == "person:1:addresses:2"
    ));
    assert_eq!(
        service.store().parent(&person).unwrap().relationship("addresses").len(),
        2
    );
}

#[test]
fn fragment_edit_marks_parent_dirty() {
    let mut service = service();
    let person = loaded_person(&mut service);
    let address = service.store().parent(&person).unwrap().relationship("addresses")[0].clone();

    assert!(!service.is_dirty(&person).unwrap());
    assert!(!service.store().fragment(&address).unwrap().is_dirty());

    service
        .store_mut()
        .fragment_mut(&address)
        .unwrap()
        .set("street", json!("456 Oak Ave"));

    assert!(service.store().fragment(&address).unwrap().is_dirty());
    assert!(service.is_dirty(&person).unwrap());
    assert_eq!(service.dirty_fragments(&person).unwrap(), vec![address]);
}

#[test]
fn removal_of_only_fragment_marks_parent_dirty() {
    let mut service = service();
    let person = loaded_person(&mut service);
    let address = service.store().parent(&person).unwrap().relationship("addresses")[0].clone();

    service.remove_fragment(&person, "addresses", &address).unwrap();
    assert!(service.is_dirty(&person).unwrap());
}

#[test]
fn commit_unloads_removed_fragments_and_cleans_state() {
    let mut service = service();
    let person = loaded_person(&mut service);
    let original = service.store().parent(&person).unwrap().relationship("addresses")[0].clone();
    let added = service
        .append_fragment(&person, "addresses", street("456 Oak Ave"))
        .unwrap();
    service.remove_fragment(&person, "addresses", &original).unwrap();
    assert!(service.is_dirty(&person).unwrap());

    service.commit(&person).unwrap();

    assert!(!service.is_dirty(&person).unwrap());
    assert!(service.store().peek_fragment(&original).is_none());
    let kept = service.store().fragment(&added).unwrap();
    assert_eq!(kept.position(), 0);
    assert!(!kept.is_new());
    assert_eq!(service.store().deleted_fragments().len(), 0);
}

#[test]
fn rollback_restores_removed_and_drops_appended_fragments() {
    let mut service = service();
    let person = loaded_person(&mut service);
    let original = service.store().parent(&person).unwrap().relationship("addresses")[0].clone();
    service
        .store_mut()
        .fragment_mut(&original)
        .unwrap()
        .set("street", json!("changed"));
    let added = service
        .append_fragment(&person, "addresses", street("456 Oak Ave"))
        .unwrap();
    service.remove_fragment(&person, "addresses", &original).unwrap();

    service.rollback(&person).unwrap();

    assert!(!service.is_dirty(&person).unwrap());
    assert!(service.store().peek_fragment(&added).is_none());
    let restored = service.store().fragment(&original).unwrap();
    assert!(!restored.is_deleted());
    assert_eq!(restored.position(), 0);
    assert_eq!(restored.get("street"), Some(&json!("123 Main St")));
}

#[test]
fn full_round_trip_normalize_modify_serialize() {
    let mut service = service();
    let person = loaded_person(&mut service);
    let address = service.store().parent(&person).unwrap().relationship("addresses")[0].clone();
    assert_eq!(address.as_str(), "person:1:addresses:0");

    service
        .store_mut()
        .fragment_mut(&address)
        .unwrap()
        .set("street", json!("999 New St"));
    service
        .store_mut()
        .parent_mut(&person)
        .unwrap()
        .set("name", json!("Jane Doe"));
    service
        .append_fragment(&person, "addresses", street("456 Oak Ave"))
        .unwrap();

    let json = service.serialize(&person, SerializeOptions::default()).unwrap();
    assert_eq!(json["name"], "Jane Doe");
    assert_eq!(
        json["addresses"],
        json!([
            { "street": "999 New St", "city": "Springfield" },
            { "street": "456 Oak Ave" }
        ])
    );
}

#[test]
fn removing_committed_fragment_keeps_it_for_deletion() {
    let mut service = service();
    let person = loaded_person(&mut service);
    let address = service.store().parent(&person).unwrap().relationship("addresses")[0].clone();

    service.remove_fragment(&person, "addresses", &address).unwrap();

    assert!(service.store().fragment(&address).unwrap().is_deleted());
    assert_eq!(service.store().deleted_fragments().len(), 1);
}

#[test]
fn append_after_removing_uncommitted_fragment_reuses_position() {
    let mut service = service();
    let person = service.create_parent("person", Some("1"), Attributes::new()).unwrap();
    service.commit(&person).unwrap();

    let first = service.append_fragment(&person, "addresses", street("A")).unwrap();
    service.remove_fragment(&person, "addresses", &first).unwrap();
    assert!(service.store().peek_fragment(&first).is_none());
    assert_eq!(service.store().fragment_count(), 0);

    service.commit(&person).unwrap();
    let second = service.append_fragment(&person, "addresses", street("B")).unwrap();
    assert_eq!(second.as_str(), "person:1:addresses:0");

    service.remove_fragment(&person, "addresses", &second).unwrap();
    service.rollback(&person).unwrap();
    let third = service.append_fragment(&person, "addresses", street("C")).unwrap();
    assert_eq!(third.as_str(), "person:1:addresses:0");
    assert_eq!(service.store().deleted_fragments().len(), 0);
}

#[test]
fn committing_deleted_owner_unloads_it_with_fragments() {
    let mut service = service();
    let person = loaded_person(&mut service);
    let address = service.store().parent(&person).unwrap().relationship("addresses")[0].clone();

    service.store_mut().parent_mut(&person).unwrap().mark_deleted();
    assert!(service.is_dirty(&person).unwrap());

    service.commit(&person).unwrap();

    assert!(service.store().peek_parent(&person).is_none());
    assert!(service.store().peek_fragment(&address).is_none());
    assert_eq!(service.store().fragment_count(), 0);
}

#[test]
fn failed_link_leaves_no_appended_fragment_behind() {
    let mut service = service();
    let person = service.create_parent("person", Some("1"), Attributes::new()).unwrap();
    let first = service.append_fragment(&person, "addresses", street("A")).unwrap();
    service.store_mut().unload_fragment(&first);

    let err = service
        .append_fragment(&person, "addresses", street("B"))
        .unwrap_err();
    assert!(matches!(
        err,
        TransformError::Store(StoreError::FragmentNotFound(ref id)) if id == &first
    ));

    let stray = fragments_core::encode("person", "1", "addresses", 1, None);
    assert!(service.store().peek_fragment(&stray).is_none());
    assert_eq!(
        service.store().parent(&person).unwrap().relationship("addresses"),
        &[first]
    );
}
