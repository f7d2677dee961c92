//! Live views: sorted maintenance under inserts/removals, race-safe
//! reloads, and the paging variants.

mod support;

use support::{run, settle, TestSource};

use keyper::query::{Criteria, OrderBy};
use keyper::view::{CollectionView, LoadMoreView, PaginatedView, ViewOptions};
use keyper::{record, Collection, CollectionConfig, Db, Key, Value};

use std::sync::Arc;

fn seeded_posts(source: &Arc<TestSource>, count: i64) -> (Db, Collection) {
    source.seed(
        "posts",
        (1..=count).map(|i| record! { "id" => i, "text" => format!("post {i}") }),
    );
    let db = Db::new();
    let posts = db
        .create_collection("posts", CollectionConfig::new(source.clone()))
        .unwrap();
    (db, posts)
}

fn like(pattern: &str) -> Criteria {
    Criteria::parse(&record! { "text" => record! { "$like" => pattern } }.into()).unwrap()
}

fn texts(items: &[Arc<keyper::Entity>]) -> Vec<String> {
    items
        .iter()
        .map(|e| e.get("text").unwrap().as_str().unwrap().to_string())
        .collect()
}

#[test]
fn view_reflects_matching_inserts_at_their_sorted_position() {
    run(async {
        let source = TestSource::new();
        let (_db, posts) = seeded_posts(&source, 50);

        let view = CollectionView::new(
            &posts,
            ViewOptions::new()
                .filter(like("post 1%"))
                .order_by(OrderBy::parse("text").unwrap()),
        );
        view.load().await.unwrap();

        // "post 1" and "post 10".."post 19".
        assert_eq!(view.len(), 11);

        posts.create(record! { "text" => "post 101" }).await.unwrap();

        let items = view.items();
        assert_eq!(items.len(), 12);
        assert_eq!(items[2].get("text").unwrap(), &"post 101");

        // A non-matching create leaves the view alone.
        posts.create(record! { "text" => "post 999" }).await.unwrap();
        assert_eq!(view.len(), 12);
    });
}

#[test]
fn view_drops_removed_items_and_replaced_snapshots() {
    run(async {
        let source = TestSource::new();
        let (_db, posts) = seeded_posts(&source, 5);

        let view = CollectionView::new(
            &posts,
            ViewOptions::new()
                .filter(like("post%"))
                .order_by(OrderBy::parse("text").unwrap()),
        );
        view.load().await.unwrap();
        assert_eq!(view.len(), 5);

        posts.remove(&Key::Int(3));
        assert_eq!(view.len(), 4);
        assert!(!view.contains(&Key::Int(3)));

        // A replacement that stops matching falls out of the view.
        posts
            .insert(record! { "id" => 1, "text" => "draft 1" })
            .unwrap();
        assert_eq!(view.len(), 3);
        assert!(!view.contains(&Key::Int(1)));

        // A replacement that still matches is re-sorted, not duplicated.
        posts
            .insert(record! { "id" => 2, "text" => "post 9" })
            .unwrap();
        let items = view.items();
        assert_eq!(items.len(), 3);
        assert_eq!(texts(&items), ["post 4", "post 5", "post 9"]);
    });
}

#[test]
fn superseded_loads_are_discarded() {
    run(async {
        let source = TestSource::new();
        let (_db, posts) = seeded_posts(&source, 30);

        let view = Arc::new(CollectionView::new(
            &posts,
            ViewOptions::new()
                .filter(like("post 1%"))
                .order_by(OrderBy::parse("text").unwrap()),
        ));

        source.gate();
        let first = {
            let view = view.clone();
            tokio::spawn(async move { view.load().await })
        };
        settle().await;

        // Supersede the first load before it resolves.
        let second = {
            let view = view.clone();
            tokio::spawn(async move { view.set_filter(like("post 2%")).await })
        };
        settle().await;

        // Resolve the second query first, then the first.
        assert_eq!(source.release("post 2"), 1);
        settle().await;
        assert_eq!(source.release(""), 1);
        source.release_all();

        second.await.unwrap().unwrap();
        first.await.unwrap().unwrap();

        // The view reflects the newer query even though the older response
        // arrived last.
        let items = view.items();
        assert_eq!(items.len(), 11);
        assert!(texts(&items).iter().all(|text| text.starts_with("post 2")));
    });
}

#[test]
fn set_filter_with_an_equal_filter_is_a_noop() {
    run(async {
        let source = TestSource::new();
        let (_db, posts) = seeded_posts(&source, 10);

        let view = CollectionView::new(
            &posts,
            ViewOptions::new()
                .filter(like("post%"))
                .order_by(OrderBy::parse("text").unwrap()),
        );
        view.load().await.unwrap();
        assert_eq!(source.calls("find"), 1);

        view.set_filter(like("post%")).await.unwrap();
        assert_eq!(source.calls("find"), 1);

        view.set_filter(like("post 1%")).await.unwrap();
        assert_eq!(source.calls("find"), 2);
    });
}

#[test]
fn from_cache_views_load_through_the_local_filter() {
    run(async {
        let source = TestSource::new();
        let (_db, posts) = seeded_posts(&source, 10);
        for i in 1..=10 {
            posts
                .insert(record! { "id" => i, "text" => format!("post {i}") })
                .unwrap();
        }

        let view = CollectionView::new(
            &posts,
            ViewOptions::new()
                .filter(like("post 1%"))
                .order_by(OrderBy::parse("text").unwrap())
                .from_cache(),
        );
        view.load().await.unwrap();

        assert_eq!(view.len(), 2);
        assert_eq!(source.calls("find"), 0);
    });
}

#[test]
fn disposing_a_view_detaches_its_bindings() {
    run(async {
        let source = TestSource::new();
        let (_db, posts) = seeded_posts(&source, 3);

        let view = CollectionView::new(
            &posts,
            ViewOptions::new()
                .filter(like("post%"))
                .order_by(OrderBy::parse("text").unwrap()),
        );
        view.load().await.unwrap();
        assert_eq!(posts.inserted().listener_count(), 1);

        view.dispose();
        assert_eq!(posts.inserted().listener_count(), 0);
        assert_eq!(posts.removed().listener_count(), 0);
    });
}

#[test]
fn paginated_view_pages_and_tracks_the_total() {
    run(async {
        let source = TestSource::new();
        let (_db, posts) = seeded_posts(&source, 45);

        let view = PaginatedView::new(
            &posts,
            ViewOptions::new()
                .filter(like("post%"))
                .order_by(OrderBy::parse("id").unwrap()),
            10,
        );
        view.load().await.unwrap();

        assert_eq!(view.len(), 10);
        assert_eq!(view.total(), 45);
        assert_eq!(view.items()[0].get("id").unwrap(), &Value::I64(1));

        view.set_page(4).await.unwrap();
        assert_eq!(view.current_page(), 4);
        assert_eq!(view.len(), 5);
        assert_eq!(view.items()[0].get("id").unwrap(), &Value::I64(41));

        // A matching removal decrements the total.
        posts.remove(&Key::Int(42));
        assert_eq!(view.total(), 44);
    });
}

#[test]
fn paginated_view_skips_inserts_outside_the_page_window() {
    run(async {
        let source = TestSource::new();
        let (_db, posts) = seeded_posts(&source, 30);

        let view = PaginatedView::new(
            &posts,
            ViewOptions::new()
                .filter(like("post%"))
                .order_by(OrderBy::parse("id").unwrap()),
            10,
        );
        view.load().await.unwrap();
        assert_eq!(view.len(), 10);

        // Sorts after the last item of page 0, which is not the last page.
        posts.insert(record! { "id" => 100, "text" => "post x" }).unwrap();
        assert_eq!(view.len(), 10);
        assert!(!view.contains(&Key::Int(100)));
        // Still counted.
        assert_eq!(view.total(), 31);

        // Sorts inside the window: inserted.
        posts
            .insert(record! { "id" => 0, "text" => "post zero" })
            .unwrap();
        assert!(view.contains(&Key::Int(0)));
    });
}

#[test]
fn load_more_accumulates_pages_without_duplicates() {
    run(async {
        let source = TestSource::new();
        let (_db, posts) = seeded_posts(&source, 25);

        let view = LoadMoreView::new(
            &posts,
            ViewOptions::new()
                .filter(like("post%"))
                .order_by(OrderBy::parse("id").unwrap()),
            10,
        );
        view.load().await.unwrap();
        assert_eq!(view.len(), 10);

        view.load_more().await.unwrap();
        assert_eq!(view.len(), 20);

        view.load_more().await.unwrap();
        assert_eq!(view.len(), 25);
        assert_eq!(view.total(), 25);

        // Accumulated items stay sorted and deduplicated.
        let ids: Vec<i64> = view
            .items()
            .iter()
            .map(|e| match e.get("id").unwrap() {
                Value::I64(id) => *id,
                _ => unreachable!(),
            })
            .collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(ids, sorted);

        // A filter change resets the accumulated state to one fresh page.
        view.set_filter(like("post 1%")).await.unwrap();
        assert_eq!(view.len(), 10);
    });
}
