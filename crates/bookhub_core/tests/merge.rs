use bookhub_core::{merge, Collection, Record};
use pretty_assertions::assert_eq;

fn book(title: &str, identifier: Option<&str>, image: Option<&str>) -> Record {
    Record::new(
        title,
        identifier.map(ToOwned::to_owned),
        image.map(ToOwned::to_owned),
        None,
    )
    .expect("valid record")
}

fn batch() -> Vec<Record> {
    vec![
        book("Dune", Some("B000000001"), None),
        book("Emma", Some("B000000002"), None),
        book("Untracked", None, Some("https://img.example/u.jpg")),
        book("Dune (dup)", Some("B000000001"), None),
    ]
}

#[test]
fn merging_nothing_is_identity() {
    let base: Collection = batch().into_iter().collect();
    assert_eq!(merge(base.clone(), Vec::new()), base);
}

#[test]
fn merge_is_idempotent_and_monotonic() {
    let base: Collection = vec![book("Old", Some("B000000009"), None)]
        .into_iter()
        .collect();

    let once = merge(base.clone(), batch());
    let twice = merge(once.clone(), batch());

    assert_eq!(twice, once);
    assert!(once.len() >= base.len());
    assert_eq!(once.len(), 4);
}

#[test]
fn first_record_for_a_key_is_kept() {
    let first = merge(
        Collection::new(),
        vec![book("Original", Some("B000000001"), Some("https://img/a.jpg"))],
    );
    let later = merge(
        first,
        vec![book("Richer title", Some("B000000001"), Some("https://img/b.jpg"))],
    );

    assert_eq!(later.len(), 1);
    let kept = later.get(&book("x", Some("B000000001"), None).key()).unwrap();
    assert_eq!(kept.title, "Original");
    assert_eq!(kept.image_url.as_deref(), Some("https://img/a.jpg"));
}

#[test]
fn records_without_identifier_dedupe_on_title_and_image() {
    let collection = merge(
        Collection::new(),
        vec![
            book("Same", None, Some("https://img/1.jpg")),
            book("Same", None, Some("https://img/1.jpg")),
            book("Same", None, Some("https://img/2.jpg")),
            book("Same", None, None),
        ],
    );
    assert_eq!(collection.len(), 3);
}

#[test]
fn absorb_reports_new_records_and_keeps_order() {
    let mut collection = Collection::new();
    assert_eq!(collection.absorb(batch()), 3);
    assert_eq!(collection.absorb(batch()), 0);

    let titles: Vec<_> = collection.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, vec!["Dune", "Emma", "Untracked"]);
}
