//! Both backends must return identical results for identical operations.

use kvetch_schema::{
    define_int_index, define_object, define_stored_id_edge, define_string_index, Schema,
};
use kvetch_shard::{InMemoryShard, ShardBackend, ShardError};
use kvetch_sqlite::SqliteShard;
use kvetch_types::{attrs, ObjectId, Page, Value};

fn schema() -> Schema {
    Schema::new(
        vec![define_object("Test", 1000), define_object("Other", 1001)],
        vec![
            define_int_index("num_index", "Test", "num"),
            define_string_index("name_index", "Test", "name"),
        ],
        vec![define_stored_id_edge("related_edge", 12345, "related_id", "Test")],
    )
    .unwrap()
}

fn id(n: u128) -> ObjectId {
    ObjectId::from_u128(n)
}

/// Runs a fixed script and renders every observable result as text.
async fn transcript(shard: &dyn ShardBackend) -> Vec<String> {
    let schema = schema();
    let num_index = schema.index("num_index").unwrap();
    let name_index = schema.index("name_index").unwrap();
    let edge = schema.edge("related_edge").unwrap();
    let mut out = Vec::new();

    for (n, num) in [(30, 7), (10, 5), (20, 6)] {
        shard
            .insert_object(id(n), 1000, &attrs! { "num" => num, "name" => format!("n{num}") })
            .await
            .unwrap();
    }
    shard.insert_object(id(40), 1001, &attrs! { "num" => 8 }).await.unwrap();
    shard
        .insert_objects(&[id(50), id(60)], 1000, &[attrs! { "num" => 9 }, attrs! {}])
        .await
        .unwrap();

    let pages = [
        Page::all(),
        Page::all().after(id(5)),
        Page::all().after(id(10)),
        Page::all().after(id(15)),
        Page::all().after(id(60)),
        Page::all().first(2),
        Page::all().after(id(15)).first(1),
        Page::all().first(0),
    ];
    for page in pages {
        let ids: Vec<_> = shard
            .get_objects_of_type(1000, page)
            .await
            .unwrap()
            .into_keys()
            .map(|id| id.as_u128())
            .collect();
        out.push(format!("scan {page:?} -> {ids:?}"));
    }

    let got = shard.get_objects(&[id(10), id(40), id(99)]).await.unwrap();
    let mut present: Vec<_> = got
        .iter()
        .map(|(k, v)| (k.as_u128(), v.as_ref().map(|r| r.type_id)))
        .collect();
    present.sort();
    out.push(format!("get_objects -> {present:?}"));

    shard.update_object(id(10), &attrs! { "num" => 50, "extra" => true }).await.unwrap();
    let record = shard.get_object(id(10)).await.unwrap().unwrap();
    out.push(format!("updated -> {:?}", record.attributes));

    let errors = [
        shard.insert_object(id(10), 1000, &attrs! {}).await.unwrap_err(),
        shard.update_object(id(77), &attrs! {}).await.unwrap_err(),
        shard.delete_object(id(77)).await.unwrap_err(),
        shard.get_objects(&[]).await.unwrap_err(),
        shard.insert_object(id(78), 1000, &attrs! { "obj_id" => 1 }).await.unwrap_err(),
    ];
    for err in errors {
        out.push(format!("error -> {err}"));
    }

    for (value, target) in [(4, 30), (4, 10), (5, 20)] {
        shard.insert_index_entry(num_index, &value.into(), id(target)).await.unwrap();
    }
    shard.insert_index_entry(name_index, &"n5".into(), id(10)).await.unwrap();
    shard.delete_index_entry(num_index, &5.into(), id(20)).await.unwrap();
    for value in [4, 5, 6] {
        let ids: Vec<_> = shard
            .get_index_entries(num_index, &value.into())
            .await
            .unwrap()
            .iter()
            .map(ObjectId::as_u128)
            .collect();
        out.push(format!("index num={value} -> {ids:?}"));
    }
    let names = shard.get_index_entries(name_index, &"n5".into()).await.unwrap();
    out.push(format!("index name=n5 -> {}", names.len()));
    assert!(matches!(
        shard.insert_index_entry(num_index, &"x".into(), id(1)).await,
        Err(ShardError::Schema(_))
    ));

    for to in [0xf2, 0x54, 0xe5] {
        shard
            .insert_edge(edge, id(1), id(to), &attrs! { "w" => Value::Int(to as i64) })
            .await
            .unwrap();
    }
    let err = shard.insert_edge(edge, id(1), id(0x54), &attrs! {}).await.unwrap_err();
    out.push(format!("edge dup -> {err}"));
    let edge_pages = [
        Page::all(),
        Page::all().after(id(0xf2)),
        Page::all().after(id(0xe5)),
        Page::all().after(id(0x01)),
        Page::all().first(2),
        Page::all().after(id(0x54)).first(1),
    ];
    for page in edge_pages {
        let edges = shard.get_edges(edge, id(1), page).await.unwrap();
        let rendered: Vec<_> = edges
            .iter()
            .map(|e| format!("{:x}:{:?}", e.to_id.as_u128(), e.payload.get("w")))
            .collect();
        out.push(format!("edges {page:?} -> {rendered:?}"));
    }

    shard.delete_object(id(20)).await.unwrap();
    out.push(format!("deleted -> {:?}", shard.get_object(id(20)).await.unwrap()));
    out
}

#[tokio::test]
async fn memory_and_sqlite_agree() {
    let memory = InMemoryShard::new();
    let sqlite = SqliteShard::in_memory().unwrap();
    sqlite.init_tables(&schema()).await.unwrap();

    let expected = transcript(&memory).await;
    let actual = transcript(&sqlite).await;
    assert_eq!(expected, actual);

    // spot-check the shared transcript itself
    assert_eq!(expected[0], format!("scan {:?} -> [10, 20, 30, 50, 60]", Page::all()));
    assert_eq!(
        expected[3],
        format!("scan {:?} -> [20, 30, 50, 60]", Page::all().after(id(15)))
    );
    assert!(expected.iter().any(|l| l.ends_with("-> []") && l.starts_with("scan")));
    assert!(expected.contains(&"index num=4 -> [10, 30]".to_string()));
    assert!(expected.contains(&"index num=5 -> []".to_string()));
    assert!(expected.contains(&"deleted -> None".to_string()));
}

#[tokio::test]
async fn file_backed_sqlite_agrees_too() {
    let dir = tempfile::tempdir().unwrap();
    let sqlite = SqliteShard::open(dir.path().join("conformance.db"), 4).unwrap();
    sqlite.init_tables(&schema()).await.unwrap();
    let memory = InMemoryShard::new();
    assert_eq!(transcript(&memory).await, transcript(&sqlite).await);
}
