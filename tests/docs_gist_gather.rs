//! Gist (path discovery) and gather (columnar projection) end to end.

use vellum::{Arena, DocId, DocStore, ElementType, Format, MemoryKv};

fn store_with(json_by_key: &[(i64, &str)]) -> DocStore<MemoryKv> {
    let store = DocStore::new(MemoryKv::new());
    let arena = Arena::new();
    for (key, json) in json_by_key {
        store
            .docs_write(
                &arena,
                None,
                &[DocId::at(*key)],
                None,
                Format::Json,
                &[Some(json.as_bytes())],
            )
            .unwrap();
    }
    store
}

#[test]
fn gist_unions_leaf_paths() {
    let store = store_with(&[(1, r#"{"a":1}"#), (2, r#"{"a":2,"b":{"c":3}}"#)]);
    let arena = Arena::new();
    let gist = store
        .docs_gist(&arena, None, &[DocId::at(1), DocId::at(2)])
        .unwrap();

    assert_eq!(gist.field_count(), 2);
    assert_eq!(gist.paths(), &["/a", "/b/c"]);
    assert!(gist.contains("/a"));
    assert!(!gist.contains("/b"));

    // packed layout: NUL-terminated strings + start offsets
    assert_eq!(gist.packed(), b"/a\0/b/c\0");
    assert_eq!(gist.offsets(), &[0, 3]);
}

#[test]
fn gist_handles_arrays_escapes_and_duplicates() {
    let store = store_with(&[
        (1, r#"{"xs":[{"v":1},{"v":2}],"a/b":0,"t~":0}"#),
        (2, r#"{"xs":[{"v":9}]}"#),
    ]);
    let arena = Arena::new();
    let ids = [DocId::at(1), DocId::at(2), DocId::at(1)];
    let gist = store.docs_gist(&arena, None, &ids).unwrap();
    assert_eq!(
        gist.paths(),
        &["/a~1b", "/t~0", "/xs/0/v", "/xs/1/v"]
    );
}

#[test]
fn gist_skips_missing_documents() {
    let store = store_with(&[(1, r#"{"a":1}"#)]);
    let arena = Arena::new();
    let gist = store
        .docs_gist(&arena, None, &[DocId::at(1), DocId::at(404)])
        .unwrap();
    assert_eq!(gist.paths(), &["/a"]);
}

#[test]
fn gather_coerces_into_i32_column() {
    let store = store_with(&[
        (1, r#"{"x":"42"}"#),
        (2, r#"{"x":42}"#),
        (3, r#"{"x":true}"#),
        (4, r#"{"x":{}}"#),
    ]);
    let arena = Arena::new();
    let ids = [DocId::at(1), DocId::at(2), DocId::at(3), DocId::at(4)];
    let gather = store
        .docs_gather(&arena, None, &ids, &["/x"], &[ElementType::I32])
        .unwrap();

    let col = &gather.columns()[0];
    let validity: Vec<bool> = (0..4).map(|i| col.is_valid(i)).collect();
    let conversion: Vec<bool> = (0..4).map(|i| col.converted(i)).collect();
    let collision: Vec<bool> = (0..4).map(|i| col.collided(i)).collect();
    assert_eq!(validity, [true, true, true, false]);
    assert_eq!(conversion, [true, false, true, false]);
    assert_eq!(collision, [false, false, false, true]);

    let cell = |i: usize| i32::from_le_bytes(col.scalar_bytes(i).unwrap().try_into().unwrap());
    assert_eq!(cell(0), 42);
    assert_eq!(cell(1), 42);
    assert_eq!(cell(2), 1);
}

#[test]
fn gather_exactly_one_state_per_cell() {
    let store = store_with(&[(
        1,
        r#"{"n":null,"i":7,"f":1.5,"s":"txt","b":true,"o":{},"a":[1]}"#,
    )]);
    let arena = Arena::new();
    let fields = ["/n", "/i", "/f", "/s", "/b", "/o", "/a", "/missing"];
    let types = [ElementType::F64; 8];
    let gather = store
        .docs_gather(&arena, None, &[DocId::at(1)], &fields, &types)
        .unwrap();

    for (j, col) in gather.columns().iter().enumerate() {
        let valid = col.is_valid(0);
        let collided = col.collided(0);
        assert!(
            !(valid && collided),
            "field {} is both valid and collided",
            fields[j]
        );
    }
    // the scalar-ish sources landed
    assert!(gather.columns()[1].is_valid(0));
    assert!(gather.columns()[2].is_valid(0));
    assert!(gather.columns()[4].is_valid(0));
    // containers collide, null and missing stay zeroed
    assert!(gather.columns()[5].collided(0));
    assert!(gather.columns()[6].collided(0));
    assert!(!gather.columns()[0].is_valid(0) && !gather.columns()[0].collided(0));
    assert!(!gather.columns()[7].is_valid(0) && !gather.columns()[7].collided(0));
}

#[test]
fn gather_string_column_shares_one_tape() {
    let store = store_with(&[
        (1, r#"{"s":"alpha","n":12}"#),
        (2, r#"{"s":true,"n":"34"}"#),
    ]);
    let arena = Arena::new();
    let ids = [DocId::at(1), DocId::at(2)];
    let gather = store
        .docs_gather(
            &arena,
            None,
            &ids,
            &["/s", "/n"],
            &[ElementType::Str, ElementType::Str],
        )
        .unwrap();

    assert_eq!(gather.cell_bytes(0, 0).unwrap(), b"alpha\0");
    assert_eq!(gather.cell_bytes(0, 1).unwrap(), b"true\0");
    assert_eq!(gather.cell_bytes(1, 0).unwrap(), b"12\0");
    assert_eq!(gather.cell_bytes(1, 1).unwrap(), b"34\0");

    let s = &gather.columns()[0];
    assert!(!s.converted(0), "string to string is not a conversion");
    assert!(s.converted(1), "bool to string is a conversion");
}

#[test]
fn gather_missing_documents_collide_everywhere() {
    let store = store_with(&[(1, r#"{"x":1}"#)]);
    let arena = Arena::new();
    let ids = [DocId::at(1), DocId::at(404)];
    let gather = store
        .docs_gather(&arena, None, &ids, &["/x"], &[ElementType::I64])
        .unwrap();
    let col = &gather.columns()[0];
    assert!(col.is_valid(0));
    assert!(col.collided(1));
    assert!(!col.is_valid(1));
}

#[test]
fn gather_uuid_and_binary_cells() {
    let store = store_with(&[(1, r#"{"u":"67e55044-10b1-426f-9247-bb680e5fe0c8"}"#)]);
    let arena = Arena::new();
    let gather = store
        .docs_gather(&arena, None, &[DocId::at(1)], &["/u"], &[ElementType::Uuid])
        .unwrap();
    let col = &gather.columns()[0];
    assert!(col.is_valid(0));
    assert!(col.converted(0));
    assert_eq!(col.scalar_bytes(0).unwrap().len(), 16);
    assert_eq!(col.scalar_bytes(0).unwrap()[0], 0x67);
}

#[test]
fn gather_rejects_empty_field() {
    let store = store_with(&[]);
    let arena = Arena::new();
    let err = store
        .docs_gather(&arena, None, &[DocId::at(1)], &[""], &[ElementType::I64])
        .unwrap_err();
    assert_eq!(
        vellum::DocError::kind_of(&err),
        Some(vellum::ErrorKind::ArgumentInvalid)
    );
}

#[test]
fn gather_null_column_is_all_clear() {
    let store = store_with(&[(1, r#"{"x":5}"#)]);
    let arena = Arena::new();
    let gather = store
        .docs_gather(&arena, None, &[DocId::at(1)], &["/x"], &[ElementType::Null])
        .unwrap();
    let col = &gather.columns()[0];
    assert!(!col.is_valid(0));
    assert!(!col.collided(0));
    assert!(matches!(col.data(), vellum::ColumnData::Empty));
}
