//! Write-through operations: create/update/delete/commit, diffs, and the
//! payload transforms.

mod support;

use support::{run, TestSource};

use keyper::{
    record, Collection, CollectionConfig, Db, Key, MutableEntity, RelationConfig, RelationMask,
    Value,
};

use std::sync::Arc;

fn posts(source: &Arc<TestSource>) -> (Db, Collection) {
    let db = Db::new();
    let posts = db
        .create_collection("posts", CollectionConfig::new(source.clone()))
        .unwrap();
    (db, posts)
}

#[test]
fn create_inserts_the_authoritative_response() {
    run(async {
        let source = TestSource::new();
        let (_db, posts) = posts(&source);

        let entity = posts.create(record! { "text" => "hello" }).await.unwrap();
        // The source assigned the pk; the cache holds the response.
        assert_eq!(entity.key(), &Key::Int(1));
        assert!(posts.cached(&Key::Int(1)).is_some());
        assert_eq!(source.calls("create"), 1);
    });
}

#[test]
fn update_sends_the_full_payload_with_the_key() {
    run(async {
        let source = TestSource::new();
        source.seed("posts", [record! { "id" => 1, "text" => "old", "stars" => 3 }]);
        let (_db, posts) = posts(&source);

        let entity = posts
            .update(&Key::Int(1), record! { "text" => "new", "stars" => 3 })
            .await
            .unwrap();
        assert_eq!(entity.get("text").unwrap(), &"new");
        assert_eq!(posts.get(&Key::Int(1)).unwrap().get("text").unwrap(), &"new");
    });
}

#[test]
fn update_diff_sends_only_changes_and_skips_empty_diffs() {
    run(async {
        let source = TestSource::new();
        source.seed("posts", [record! { "id" => 1, "text" => "old", "stars" => 3 }]);
        let (_db, posts) = posts(&source);

        posts.fetch_one(&Key::Int(1), Default::default()).await.unwrap();

        let mut mutable = posts.get_mutable(&Key::Int(1), None).unwrap();
        assert!(!posts.has_changes(&mutable).unwrap());

        // Untouched working copy: no request at all.
        let unchanged = posts.update_diff(&mutable).await.unwrap();
        assert_eq!(source.calls("update"), 0);
        assert!(Arc::ptr_eq(&unchanged, &posts.get(&Key::Int(1)).unwrap()));

        mutable.set("text", "new");
        assert!(posts.has_changes(&mutable).unwrap());
        let diff = posts.diff(&mutable).unwrap();
        assert_eq!(diff, record! { "text" => "new", "id" => 1 });

        let updated = posts.update_diff(&mutable).await.unwrap();
        assert_eq!(source.calls("update"), 1);
        assert_eq!(updated.get("text").unwrap(), &"new");
        // Fields absent from the diff survived on the source record.
        assert_eq!(updated.get("stars").unwrap(), &Value::I64(3));
    });
}

#[test]
fn update_inplace_refreshes_the_working_copy() {
    run(async {
        let source = TestSource::new();
        source.seed("posts", [record! { "id" => 1, "text" => "old" }]);
        let (_db, posts) = posts(&source);
        posts.fetch_one(&Key::Int(1), Default::default()).await.unwrap();

        let mut mutable = posts.get_mutable(&Key::Int(1), None).unwrap();
        mutable.set("text", "new");
        posts.update_inplace(&mut mutable).await.unwrap();

        assert_eq!(mutable.get("text").unwrap(), &"new");
        assert!(!posts.has_changes(&mutable).unwrap());
    });
}

#[test]
fn delete_clears_the_cached_copy() {
    run(async {
        let source = TestSource::new();
        source.seed("posts", [record! { "id" => 1, "text" => "bye" }]);
        let (_db, posts) = posts(&source);
        posts.fetch_one(&Key::Int(1), Default::default()).await.unwrap();

        let removed = Arc::new(std::sync::Mutex::new(0));
        let seen = removed.clone();
        let _guard = posts.removed().attach(move |_: &Arc<keyper::Entity>| {
            *seen.lock().unwrap() += 1;
        });

        posts.delete(&Key::Int(1)).await.unwrap();
        assert!(posts.cached(&Key::Int(1)).is_none());
        assert_eq!(*removed.lock().unwrap(), 1);

        // The source no longer has it either.
        let err = posts
            .fetch_one(&Key::Int(1), Default::default())
            .await
            .unwrap_err();
        assert!(err.is_record_not_found());
    });
}

#[test]
fn commit_routes_by_key_presence() {
    run(async {
        let source = TestSource::new();
        let (_db, posts) = posts(&source);

        let draft = MutableEntity::draft("posts", record! { "text" => "fresh" });
        let created = posts.commit(&draft).await.unwrap();
        assert_eq!(source.calls("create"), 1);

        let mut mutable = posts.get_mutable(created.key(), None).unwrap();
        mutable.set("text", "edited");
        posts.commit(&mutable).await.unwrap();
        assert_eq!(source.calls("update"), 1);
        assert_eq!(
            posts.get(created.key()).unwrap().get("text").unwrap(),
            &"edited"
        );
    });
}

#[test]
fn before_insert_and_before_send_transforms_are_authoritative() {
    run(async {
        let source = TestSource::new();
        let db = Db::new();
        let posts = db
            .create_collection(
                "posts",
                CollectionConfig::new(source.clone())
                    .before_insert(|mut record| {
                        record.insert("ingested", true);
                        record
                    })
                    .before_send(|mut record| {
                        record.remove("local_only");
                        record
                    }),
            )
            .unwrap();

        let entity = posts
            .create(record! { "id" => 1, "text" => "hi", "local_only" => true })
            .await
            .unwrap();

        // before_send stripped the local field before it reached the source;
        // before_insert stamped the response on its way into the cache.
        assert!(entity.get("local_only").is_none());
        assert_eq!(entity.get("ingested").unwrap(), &true);
    });
}

#[test]
fn mutable_back_ref_buckets_diff_per_element() {
    run(async {
        let source = TestSource::new();
        let db = Db::new();
        let posts = db
            .create_collection(
                "posts",
                CollectionConfig::new(source.clone())
                    .relation("author", RelationConfig::to("users").back_ref("posts")),
            )
            .unwrap();
        let users = db
            .create_collection("users", CollectionConfig::new(source.clone()))
            .unwrap();

        users.insert(record! { "id" => 1, "name" => "ada" }).unwrap();
        posts
            .insert(record! { "id" => 10, "author_id" => 1, "text" => "a" })
            .unwrap();
        posts
            .insert(record! { "id" => 11, "author_id" => 1, "text" => "b" })
            .unwrap();

        let mask = RelationMask::new().field("posts");
        let mut mutable = users.get_mutable(&Key::Int(1), Some(&mask)).unwrap();

        // The bucket materialized inline, ordered by pk.
        let bucket = mutable.get("posts").unwrap().as_list().unwrap().to_vec();
        assert_eq!(bucket.len(), 2);
        assert!(!users.has_changes(&mutable).unwrap());

        // Editing one member surfaces the array in the diff.
        let mut edited = bucket.clone();
        if let Value::Record(record) = &mut edited[0] {
            record.insert("text", "rewritten");
        }
        mutable.set("posts", edited);
        assert!(users.has_changes(&mutable).unwrap());
        let diff = users.diff(&mutable).unwrap();
        let members = diff.get("posts").unwrap().as_list().unwrap();
        assert_eq!(members.len(), 2);

        // Dropping a member changes the length and surfaces too.
        mutable.set("posts", vec![bucket[0].clone()]);
        assert!(users.has_changes(&mutable).unwrap());
    });
}
