mod common;

use std::collections::BTreeMap;

use common::*;
use vellum_content::{ContentError, ValidationError};
use vellum_model::{AttrValue, QName, StandardName};
use vellum_store::PropertyType;

#[test]
fn content_type_lives_on_the_file_body() {
    let repository = repository();
    let provider = provider(&repository);
    let session = session();
    let file = root(&provider, &session)
        .add(&name("readme.txt"), &[nt("file")])
        .unwrap();

    assert_eq!(
        file.get(&content_type()).unwrap(),
        Some(AttrValue::from("application/octet-stream"))
    );
    assert_eq!(file.put(&content_type(), "text/plain;encoding=utf-8").unwrap(), None);
    assert_eq!(
        file.get(&content_type()).unwrap(),
        Some(AttrValue::from("text/plain;encoding=utf-8"))
    );

    let previous = file.put(&content_type(), "text/markdown").unwrap();
    assert_eq!(previous, Some(AttrValue::from("text/plain;encoding=utf-8")));
    assert_eq!(
        file.get(&content_type()).unwrap(),
        Some(AttrValue::from("text/markdown"))
    );
    assert_eq!(
        file.attribute_type(&content_type()).unwrap(),
        Some(PropertyType::String)
    );
}

#[test]
fn content_type_is_rejected_on_non_files() {
    let repository = repository();
    let provider = provider(&repository);
    let session = session();
    let plain = root(&provider, &session).add(&ex("plain"), &[]).unwrap();

    assert_eq!(plain.get(&content_type()).unwrap(), None);
    assert!(matches!(
        plain.put(&content_type(), "text/plain"),
        Err(ContentError::Validation(ValidationError::NotAFile(_)))
    ));
    assert!(matches!(
        plain.read_data(),
        Err(ContentError::Validation(ValidationError::NotAFile(_)))
    ));
}

#[test]
fn file_data_round_trips() {
    let repository = repository();
    let provider = provider(&repository);
    let session = session();
    let file = root(&provider, &session)
        .add(&name("blob.bin"), &[nt("file")])
        .unwrap();
    assert!(file.read_data().unwrap().is_empty());

    file.write_data(&[0, 159, 146, 150]).unwrap();
    let again = provider.get(&session, "blob.bin").unwrap();
    assert_eq!(again.read_data().unwrap(), vec![0, 159, 146, 150]);
}

#[test]
fn versioning_flags_follow_the_node_state() {
    let repository = repository();
    let provider = provider(&repository);
    let session = session();
    let root = root(&provider, &session);
    let plain = root.add(&ex("plain"), &[]).unwrap();
    let doc = root.add(&ex("doc"), &[doc_class()]).unwrap();

    let checked_out = StandardName::CheckedOut.qname();
    let checked_in = StandardName::CheckedIn.qname();
    assert_eq!(plain.get(&checked_out).unwrap(), None);
    assert_eq!(plain.get(&checked_in).unwrap(), None);
    assert!(!plain.contains_key(&checked_out).unwrap());

    assert_eq!(doc.get(&checked_out).unwrap(), Some(AttrValue::Boolean(true)));
    assert_eq!(doc.get(&checked_in).unwrap(), None);
    assert!(doc.keys().unwrap().contains(&checked_out));

    assert!(matches!(
        doc.put(&checked_in, true),
        Err(ContentError::Validation(ValidationError::ReadOnlyAttribute(_)))
    ));
    assert!(matches!(
        doc.remove_attr(&checked_out),
        Err(ContentError::Validation(ValidationError::ReadOnlyAttribute(_)))
    ));
}

#[test]
fn attributes_are_written_and_removed() {
    let repository = repository();
    let provider = provider(&repository);
    let session = session();
    let node = root(&provider, &session).add(&ex("note"), &[]).unwrap();

    assert_eq!(node.put(&title(), "draft").unwrap(), None);
    assert_eq!(
        node.put(&title(), "final").unwrap(),
        Some(AttrValue::from("draft"))
    );
    let tags = ex("tags");
    node.put(&tags, AttrValue::List(vec!["a".into(), "b".into()]))
        .unwrap();
    assert!(node.is_multiple(&tags).unwrap());
    assert!(!node.is_multiple(&title()).unwrap());
    assert_eq!(node.attribute_type(&title()).unwrap(), Some(PropertyType::String));

    let keys = node.keys().unwrap();
    assert!(keys.contains(&title()));
    assert!(keys.contains(&tags));

    assert_eq!(
        node.remove_attr(&title()).unwrap(),
        Some(AttrValue::from("final"))
    );
    assert!(!node.contains_key(&title()).unwrap());
    assert_eq!(node.remove_attr(&title()).unwrap(), None);
}

#[test]
fn children_iterate_in_name_order_and_can_be_removed() {
    let repository = repository();
    let provider = provider(&repository);
    let session = session();
    let root = root(&provider, &session);
    let folder = root.add(&name("folder"), &[nt("folder")]).unwrap();
    for local in ["c", "a", "b"] {
        folder.add(&name(local), &[nt("file")]).unwrap();
    }

    let mut children = folder.children().unwrap();
    assert_eq!(children.len(), 3);
    let first = children.next().unwrap();
    assert_eq!(first.path(), "/folder/a");
    assert_eq!(first.name().unwrap(), name("a"));
    assert_eq!(first.parent().unwrap().path(), "/folder");
    children.remove_current().unwrap();
    let rest: Vec<String> = children.map(|node| node.path().to_string()).collect();
    assert_eq!(rest, vec!["/folder/b".to_string(), "/folder/c".to_string()]);

    assert!(!provider.exists(&session, "folder/a").unwrap());
    assert!(provider.get(&session, "folder/a").unwrap_err().is_not_found());
    assert_eq!(folder.children().unwrap().len(), 2);
}

#[test]
fn folders_report_the_collection_class() {
    let repository = repository();
    let provider = provider(&repository);
    let session = session();
    let folder = root(&provider, &session)
        .add(&name("docs"), &[nt("folder")])
        .unwrap();

    let classes = folder.content_classes().unwrap();
    assert_eq!(classes[0], nt("folder"));
    assert_eq!(classes[1], StandardName::Collection.qname());
    assert!(classes.contains(&nt("hierarchyNode")));
    assert!(classes.contains(&nt("base")));
}

#[test]
fn versionable_classes_include_supertypes() {
    let repository = repository();
    let provider = provider(&repository);
    let session = session();
    let doc = root(&provider, &session)
        .add(&ex("doc"), &[doc_class()])
        .unwrap();

    let classes = doc.content_classes().unwrap();
    assert_eq!(classes[0], doc_class());
    assert!(classes.contains(&nt("unstructured")));
    assert!(classes.contains(&QName::new(vellum_model::ns::MIX, "simpleVersionable")));
}

#[test]
fn add_with_attributes_picks_the_class_from_the_keys() {
    let repository = repository();
    let provider = provider(&repository);
    let session = session();
    let root = root(&provider, &session);

    let mut attributes = BTreeMap::new();
    attributes.insert(content_type(), AttrValue::from("text/plain"));
    attributes.insert(title(), AttrValue::from("notes"));
    let file = root
        .add_with_attributes(&name("notes.txt"), &attributes, &[nt("file")])
        .unwrap();
    assert_eq!(file.content_classes().unwrap()[0], nt("file"));
    assert_eq!(file.get(&content_type()).unwrap(), Some(AttrValue::from("text/plain")));
    assert_eq!(file.get(&title()).unwrap(), Some(AttrValue::from("notes")));

    let mut attributes = BTreeMap::new();
    attributes.insert(StandardName::Collection.qname(), AttrValue::Boolean(true));
    let folder = root
        .add_with_attributes(&name("dir"), &attributes, &[])
        .unwrap();
    assert_eq!(folder.content_classes().unwrap()[0], nt("folder"));

    attributes.insert(content_type(), AttrValue::from("text/plain"));
    assert!(matches!(
        root.add_with_attributes(&name("both"), &attributes, &[]),
        Err(ContentError::Validation(ValidationError::ConflictingClasses))
    ));
    assert!(!provider.exists(&session, "both").unwrap());
}

#[test]
fn only_mixins_can_be_added_as_classes() {
    let repository = repository();
    let provider = provider(&repository);
    let session = session();
    let node = root(&provider, &session).add(&ex("titled"), &[]).unwrap();
    let mix_title = QName::new(vellum_model::ns::MIX, "title");

    node.add_content_classes(&[mix_title.clone()]).unwrap();
    assert!(node.content_classes().unwrap().contains(&mix_title));

    assert!(matches!(
        node.add_content_classes(&[nt("folder")]),
        Err(ContentError::Validation(ValidationError::NotMixin(_)))
    ));
}

#[test]
fn missing_paths_are_not_found() {
    let repository = repository();
    let provider = provider(&repository);
    let session = session();
    let err = provider.get(&session, "nowhere/at/all").unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "no content at /nowhere/at/all in workspace main");
    assert!(!provider.exists(&session, "nowhere").unwrap());
}

#[test]
fn root_is_named_after_the_workspace() {
    let repository = repository();
    let provider = provider(&repository);
    let session = session();
    let root = root(&provider, &session);
    assert_eq!(root.name().unwrap(), name("main"));
    assert_eq!(root.depth(), 1);
    assert_eq!(root.content_path(), "/main");
    assert!(root.parent().is_none());

    let child = root.add(&ex("child"), &[]).unwrap();
    assert_eq!(child.depth(), 2);
    assert_eq!(child.content_path(), "/main/ex:child");
    assert_eq!(child.name().unwrap(), ex("child"));
}

#[test]
fn undecodable_previous_values_fail_before_writing() {
    let repository = repository();
    let provider = provider(&repository);
    let session = session();
    root(&provider, &session)
        .add(&name("blob.bin"), &[nt("file")])
        .unwrap()
        .write_data(&[1, 2, 3])
        .unwrap();
    let body = provider.get(&session, "blob.bin/jcr:content").unwrap();
    let data = QName::new(vellum_model::ns::JCR, "data");

    assert!(matches!(
        body.put(&data, "text"),
        Err(ContentError::Validation(ValidationError::UnsupportedValue(_)))
    ));
    assert!(matches!(
        body.remove_attr(&data),
        Err(ContentError::Validation(ValidationError::UnsupportedValue(_)))
    ));
    provider.persist(&session).unwrap();
    let file = provider.get(&session, "blob.bin").unwrap();
    assert_eq!(file.read_data().unwrap(), vec![1, 2, 3]);
}
