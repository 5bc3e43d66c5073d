//! Optimistic writes as mounted views observe them.

mod support;

use folio::application::mutations::MutationError;
use folio::application::repos::SourceError;
use folio::application::views::{PostDetailView, PostListView};
use folio::cache::EntityKey;
use folio::domain::error::DomainError;
use folio::domain::posts::{PostChanges, PostInput, ProfileChanges};
use folio::domain::types::PostFilter;
use uuid::Uuid;

use support::{Harness, author, detail_of, identity_for, list_of, post_on, rendered_ids};

async fn mounted_list(harness: &Harness) -> PostListView {
    let snapshot = harness.bootstrap.collection(PostFilter::Published).await;
    let mut view = PostListView::mount(snapshot, &harness.channel, PostFilter::Published);
    view.poll().await;
    view
}

async fn mounted_detail(harness: &Harness, id: Uuid) -> PostDetailView {
    let snapshot = harness.bootstrap.entity(id).await;
    let mut view = PostDetailView::mount(snapshot, &harness.channel, id);
    view.poll().await;
    view
}

#[tokio::test]
async fn created_post_is_visible_before_confirmation() {
    let jane = author("Jane Doe");
    let existing = post_on(2, "Existing post", jane.id);
    let harness = Harness::mirrored(&[existing.clone()]);
    harness.seed_profile(jane.clone());
    let coordinator = harness.coordinator(Some(identity_for(&jane)));
    let mut list = mounted_list(&harness).await;
    harness.live_source.hold_writes();

    let (created, ()) = tokio::join!(
        coordinator.create(PostInput::new("Fresh post", "Body of the fresh post")),
        async {
            harness.live_source.write_arrived().await;
            list.sync();
            let render = list.render();
            let pending = &list_of(&render).posts[0];
            assert!(pending.is_pending());
            assert_eq!(pending.post.title, "Fresh post");
            assert_eq!(pending.author_label(), "Jane Doe");
            assert_eq!(list_of(&render).posts[1].id(), existing.id);
            harness.live_source.release_writes();
        }
    );

    let created = created.expect("create confirmed");
    assert!(!created.is_pending());
    assert_eq!(harness.live_source.post_count(), 2);

    list.poll().await;
    assert_eq!(rendered_ids(&list.render()), vec![created.id(), existing.id]);
    assert!(list_of(&list.render()).posts.iter().all(|p| !p.is_pending()));
}

#[tokio::test]
async fn failed_create_is_rolled_back() {
    let jane = author("Jane Doe");
    let existing = post_on(2, "Existing post", jane.id);
    let harness = Harness::mirrored(&[existing.clone()]);
    let coordinator = harness.coordinator(Some(identity_for(&jane)));
    let mut list = mounted_list(&harness).await;
    harness.live_source.set_fail_writes(true);

    let err = coordinator
        .create(PostInput::new("Doomed post", "This write is rejected"))
        .await
        .expect_err("write rejected");
    assert!(matches!(
        err,
        MutationError::Source(SourceError::Rejected(_))
    ));

    list.sync();
    assert_eq!(rendered_ids(&list.render()), vec![existing.id]);
    assert_eq!(harness.live_source.post_count(), 1);
}

#[tokio::test]
async fn update_is_applied_then_confirmed() {
    let jane = author("Jane Doe");
    let post = post_on(2, "Original title", jane.id);
    let harness = Harness::mirrored(&[post.clone()]);
    let coordinator = harness.coordinator(Some(identity_for(&jane)));
    let mut detail = mounted_detail(&harness, post.id).await;
    harness.live_source.hold_writes();

    let changes = PostChanges {
        title: Some("Edited title".to_string()),
        ..PostChanges::default()
    };
    let (updated, ()) = tokio::join!(coordinator.update(post.id, changes), async {
        harness.live_source.write_arrived().await;
        detail.sync();
        let render = detail.render();
        let pending = detail_of(&render).expect("post still visible");
        assert_eq!(pending.post.title, "Edited title");
        assert!(pending.is_pending());
        assert!(coordinator.is_in_flight(EntityKey::Post(post.id)));

        let second = coordinator
            .update(
                post.id,
                PostChanges {
                    body: Some("A second concurrent edit".to_string()),
                    ..PostChanges::default()
                },
            )
            .await;
        assert_eq!(
            second,
            Err(MutationError::InFlight(EntityKey::Post(post.id)))
        );
        harness.live_source.release_writes();
    });

    let updated = updated.expect("update confirmed");
    assert_eq!(updated.post.title, "Edited title");
    assert!(!coordinator.is_in_flight(EntityKey::Post(post.id)));

    detail.sync();
    let render = detail.render();
    let confirmed = detail_of(&render).expect("post visible");
    assert_eq!(confirmed.post.title, "Edited title");
    assert!(!confirmed.is_pending());
    assert_eq!(
        harness.live_source.post(post.id).map(|p| p.title),
        Some("Edited title".to_string())
    );
    assert_eq!(harness.live_source.write_calls(), 1);
}

#[tokio::test]
async fn failed_update_restores_the_prior_record() {
    let jane = author("Jane Doe");
    let post = post_on(2, "Original title", jane.id);
    let harness = Harness::mirrored(&[post.clone()]);
    let coordinator = harness.coordinator(Some(identity_for(&jane)));
    let mut detail = mounted_detail(&harness, post.id).await;
    harness.live_source.set_fail_writes(true);

    let changes = PostChanges {
        title: Some("Never saved".to_string()),
        ..PostChanges::default()
    };
    coordinator
        .update(post.id, changes)
        .await
        .expect_err("write rejected");

    detail.sync();
    let render = detail.render();
    let restored = detail_of(&render).expect("post visible");
    assert_eq!(restored.post.title, "Original title");
    assert!(!restored.is_pending());
    assert!(!coordinator.is_in_flight(EntityKey::Post(post.id)));
}

#[tokio::test]
async fn deleted_post_disappears_before_confirmation() {
    let jane = author("Jane Doe");
    let doomed = post_on(3, "Doomed post", jane.id);
    let kept = post_on(2, "Kept post", jane.id);
    let harness = Harness::mirrored(&[doomed.clone(), kept.clone()]);
    let coordinator = harness.coordinator(Some(identity_for(&jane)));
    let mut list = mounted_list(&harness).await;
    let mut detail = mounted_detail(&harness, doomed.id).await;
    harness.live_source.hold_writes();

    let (removed, ()) = tokio::join!(coordinator.remove(doomed.id), async {
        harness.live_source.write_arrived().await;
        list.sync();
        detail.sync();
        assert_eq!(rendered_ids(&list.render()), vec![kept.id]);
        assert!(detail_of(&detail.render()).is_none());
        harness.live_source.release_writes();
    });

    assert_eq!(removed, Ok(doomed.id));
    list.sync();
    assert_eq!(rendered_ids(&list.render()), vec![kept.id]);
    assert!(harness.store.post(doomed.id).is_none());
    assert!(harness.live_source.post(doomed.id).is_none());
}

#[tokio::test]
async fn failed_delete_brings_the_post_back() {
    let jane = author("Jane Doe");
    let doomed = post_on(3, "Survivor post", jane.id);
    let kept = post_on(2, "Kept post", jane.id);
    let harness = Harness::mirrored(&[doomed.clone(), kept.clone()]);
    let coordinator = harness.coordinator(Some(identity_for(&jane)));
    let mut list = mounted_list(&harness).await;
    harness.live_source.set_fail_writes(true);

    coordinator
        .remove(doomed.id)
        .await
        .expect_err("write rejected");

    list.sync();
    assert_eq!(rendered_ids(&list.render()), vec![doomed.id, kept.id]);
    let restored = harness.store.post(doomed.id).expect("post restored");
    assert!(!restored.is_pending());
}

#[tokio::test]
async fn profile_update_reaches_every_embedding_post() {
    let jane = author("Jane Doe");
    let first = post_on(2, "First by Jane", jane.id);
    let second = post_on(3, "Second by Jane", jane.id);
    let harness = Harness::mirrored(&[first, second]);
    harness.seed_profile(jane.clone());
    let coordinator = harness.coordinator(Some(identity_for(&jane)));
    let mut list = mounted_list(&harness).await;
    assert!(
        list_of(&list.render())
            .posts
            .iter()
            .all(|p| p.author_label() == "Jane Doe")
    );

    let profile = coordinator
        .update_profile(
            jane.id,
            ProfileChanges {
                display_name: Some("Jane Q. Public".to_string()),
                ..ProfileChanges::default()
            },
        )
        .await
        .expect("profile updated");
    assert_eq!(profile.display_label(), "Jane Q. Public");

    list.sync();
    let render = list.render();
    let labels: Vec<&str> = list_of(&render)
        .posts
        .iter()
        .map(|p| p.author_label())
        .collect();
    assert_eq!(labels, vec!["Jane Q. Public", "Jane Q. Public"]);
}

#[tokio::test]
async fn rejected_mutations_never_reach_the_backend() {
    let jane = author("Jane Doe");
    let post = post_on(2, "Existing post", jane.id);
    let harness = Harness::mirrored(&[post.clone()]);
    let mut list = mounted_list(&harness).await;

    let anonymous = harness.coordinator(None);
    assert_eq!(
        anonymous
            .create(PostInput::new("Valid title", "A valid body for the post"))
            .await,
        Err(MutationError::Unauthenticated)
    );
    assert_eq!(
        anonymous.remove(post.id).await,
        Err(MutationError::Unauthenticated)
    );

    let signed_in = harness.coordinator(Some(identity_for(&jane)));
    let err = signed_in
        .create(PostInput::new("Hi", "A valid body for the post"))
        .await
        .expect_err("short title");
    assert!(matches!(
        err,
        MutationError::Validation(DomainError::Validation { field: "title", .. })
    ));

    let err = signed_in
        .update(post.id, PostChanges::default())
        .await
        .expect_err("empty update");
    assert!(matches!(err, MutationError::Validation(_)));

    let err = signed_in
        .update_profile(
            jane.id,
            ProfileChanges {
                website: Some("not a url".to_string()),
                ..ProfileChanges::default()
            },
        )
        .await
        .expect_err("bad website");
    assert!(matches!(
        err,
        MutationError::Validation(DomainError::Validation { field: "website", .. })
    ));

    assert_eq!(harness.live_source.write_calls(), 0);
    list.sync();
    assert_eq!(rendered_ids(&list.render()), vec![post.id]);
}

#[tokio::test]
async fn refetch_during_pending_create_keeps_the_draft() {
    let jane = author("Jane Doe");
    let existing = post_on(2, "Existing post", jane.id);
    let harness = Harness::mirrored(&[existing.clone()]);
    harness.seed_profile(jane.clone());
    let coordinator = harness.coordinator(Some(identity_for(&jane)));
    let mut list = mounted_list(&harness).await;
    harness.live_source.hold_writes();

    let (created, ()) = tokio::join!(
        coordinator.create(PostInput::new("Fresh post", "Body of the fresh post")),
        async {
            harness.live_source.write_arrived().await;
            list.sync();
            list.refetch().await;
            let render = list.render();
            let posts = &list_of(&render).posts;
            assert_eq!(posts.len(), 2);
            assert_eq!(posts[0].post.title, "Fresh post");
            assert!(posts[0].is_pending());
            assert_eq!(posts[1].id(), existing.id);
            harness.live_source.release_writes();
        }
    );

    let created = created.expect("create confirmed");
    list.poll().await;
    assert_eq!(rendered_ids(&list.render()), vec![created.id(), existing.id]);
    assert!(list_of(&list.render()).posts.iter().all(|p| !p.is_pending()));
}

#[tokio::test]
async fn load_more_during_failed_create_then_rolls_back() {
    let jane = author("Jane Doe");
    let posts: Vec<_> = (1..=7)
        .map(|day| post_on(day, &format!("Post {day}"), jane.id))
        .collect();
    let harness = Harness::mirrored(&posts);
    let coordinator = harness.coordinator(Some(identity_for(&jane)));
    let mut list = mounted_list(&harness).await;
    harness.live_source.set_fail_writes(true);
    harness.live_source.hold_writes();

    let (created, ()) = tokio::join!(
        coordinator.create(PostInput::new("Doomed post", "This write is rejected")),
        async {
            harness.live_source.write_arrived().await;
            list.sync();
            assert!(list.load_more().await.expect("second page"));
            let render = list.render();
            let loaded = &list_of(&render).posts;
            assert_eq!(loaded.len(), 8);
            assert_eq!(loaded[0].post.title, "Doomed post");
            assert!(loaded[0].is_pending());
            harness.live_source.release_writes();
        }
    );

    assert!(matches!(
        created,
        Err(MutationError::Source(SourceError::Rejected(_)))
    ));
    list.sync();
    let ids = rendered_ids(&list.render());
    assert_eq!(ids.len(), 7);
    assert_eq!(ids[0], posts[6].id);
    assert!(list_of(&list.render()).posts.iter().all(|p| !p.is_pending()));
}

#[tokio::test]
async fn refetch_during_pending_update_keeps_the_edit() {
    let jane = author("Jane Doe");
    let post = post_on(2, "Original title", jane.id);
    let harness = Harness::mirrored(&[post.clone()]);
    let coordinator = harness.coordinator(Some(identity_for(&jane)));
    let mut list = mounted_list(&harness).await;
    let mut detail = mounted_detail(&harness, post.id).await;
    harness.live_source.hold_writes();

    let changes = PostChanges {
        title: Some("Edited title".to_string()),
        ..PostChanges::default()
    };
    let (updated, ()) = tokio::join!(coordinator.update(post.id, changes), async {
        harness.live_source.write_arrived().await;
        detail.refetch().await;
        list.refetch().await;

        let render = detail.render();
        let pending = detail_of(&render).expect("post still visible");
        assert_eq!(pending.post.title, "Edited title");
        assert!(pending.is_pending());
        let render = list.render();
        let listed = &list_of(&render).posts[0];
        assert_eq!(listed.post.title, "Edited title");
        assert!(listed.is_pending());
        harness.live_source.release_writes();
    });

    updated.expect("update confirmed");
    detail.sync();
    let render = detail.render();
    let confirmed = detail_of(&render).expect("post visible");
    assert_eq!(confirmed.post.title, "Edited title");
    assert!(!confirmed.is_pending());
}

#[tokio::test]
async fn refetch_during_failed_update_still_rolls_back() {
    let jane = author("Jane Doe");
    let post = post_on(2, "Original title", jane.id);
    let harness = Harness::mirrored(&[post.clone()]);
    let coordinator = harness.coordinator(Some(identity_for(&jane)));
    let mut detail = mounted_detail(&harness, post.id).await;
    harness.live_source.set_fail_writes(true);
    harness.live_source.hold_writes();

    let changes = PostChanges {
        title: Some("Never saved".to_string()),
        ..PostChanges::default()
    };
    let (updated, ()) = tokio::join!(coordinator.update(post.id, changes), async {
        harness.live_source.write_arrived().await;
        detail.refetch().await;
        let render = detail.render();
        let pending = detail_of(&render).expect("post still visible");
        assert_eq!(pending.post.title, "Never saved");
        assert!(pending.is_pending());
        harness.live_source.release_writes();
    });

    updated.expect_err("write rejected");
    detail.sync();
    let render = detail.render();
    let restored = detail_of(&render).expect("post visible");
    assert_eq!(restored.post.title, "Original title");
    assert!(!restored.is_pending());
}

#[tokio::test]
async fn refetch_during_pending_delete_keeps_it_hidden() {
    let jane = author("Jane Doe");
    let doomed = post_on(3, "Doomed post", jane.id);
    let kept = post_on(2, "Kept post", jane.id);
    let harness = Harness::mirrored(&[doomed.clone(), kept.clone()]);
    let coordinator = harness.coordinator(Some(identity_for(&jane)));
    let mut list = mounted_list(&harness).await;
    let mut detail = mounted_detail(&harness, doomed.id).await;
    harness.live_source.hold_writes();

    let (removed, ()) = tokio::join!(coordinator.remove(doomed.id), async {
        harness.live_source.write_arrived().await;
        list.refetch().await;
        detail.refetch().await;
        assert_eq!(rendered_ids(&list.render()), vec![kept.id]);
        assert!(detail_of(&detail.render()).is_none());
        harness.live_source.release_writes();
    });

    assert_eq!(removed, Ok(doomed.id));
    list.sync();
    assert_eq!(rendered_ids(&list.render()), vec![kept.id]);
    assert!(harness.store.post(doomed.id).is_none());
}

#[tokio::test]
async fn refetch_during_failed_delete_still_brings_the_post_back() {
    let jane = author("Jane Doe");
    let doomed = post_on(3, "Survivor post", jane.id);
    let kept = post_on(2, "Kept post", jane.id);
    let harness = Harness::mirrored(&[doomed.clone(), kept.clone()]);
    let coordinator = harness.coordinator(Some(identity_for(&jane)));
    let mut list = mounted_list(&harness).await;
    harness.live_source.set_fail_writes(true);
    harness.live_source.hold_writes();

    let (removed, ()) = tokio::join!(coordinator.remove(doomed.id), async {
        harness.live_source.write_arrived().await;
        list.refetch().await;
        assert_eq!(rendered_ids(&list.render()), vec![kept.id]);
        harness.live_source.release_writes();
    });

    removed.expect_err("write rejected");
    list.sync();
    assert_eq!(rendered_ids(&list.render()), vec![doomed.id, kept.id]);
    assert!(list_of(&list.render()).posts.iter().all(|p| !p.is_pending()));
}
