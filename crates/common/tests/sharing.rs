//! Integration tests for sharing private nodes between identities

mod common;

use ::common::crypto::sealed;
use ::common::linked_data::BlockEncoded;
use ::common::private::PrivateNode;
use ::common::root::RootTree;
use ::common::crypto::SecretKey;
use ::common::share::{entry_index, EntryIndex, ShareKey, SharePayload, ShareWith};
use ::common::store::BlobsStore;

/// Open a share record as `recipient` and load the entry index it points at
async fn open_entry_index(
    blobs: &BlobsStore,
    record: &::common::linked_data::Link,
    recipient: &SecretKey,
) -> (SharePayload, EntryIndex) {
    let sealed_payload = blobs.get(record).await.unwrap();
    let payload = SharePayload::decode(&sealed::open(&sealed_payload, recipient).unwrap()).unwrap();
    let entry_index = EntryIndex::load(&payload.entry_index_cid, &payload.key().unwrap(), blobs)
        .await
        .unwrap();
    (payload, entry_index)
}

#[tokio::test]
async fn test_share_to_explicit_did() {
    let (blobs, resolver) = common::setup_test_env().await;
    let alice = common::setup_user("alice", &blobs, &resolver).await;
    let bob = common::setup_user("bob", &blobs, &resolver).await;
    alice.fs.write("/docs/plan.md", b"the plan").await.unwrap();

    let bob_did = bob.exchange_key.did();
    let index_before = alice.fs.inner().await.root.index.len();
    let details = alice
        .fs
        .share(
            &["/docs/plan.md"],
            alice.share_options(ShareWith::parse(&bob_did)),
        )
        .await
        .unwrap();
    assert_eq!(details.share_id, "1");
    assert_eq!(details.shared_by.root_did, alice.root_key.did());

    let inner = alice.fs.inner().await;
    let shares = inner.root.shares();
    assert_eq!(shares.len(), 1);
    assert_eq!(
        shares[0].name,
        ShareKey::create(1, &bob_did, &alice.root_key.did())
    );

    // the record opens only for bob and points at a single soft-link
    let sealed_payload = blobs.get(&shares[0].link).await.unwrap();
    assert!(sealed::open(&sealed_payload, &alice.exchange_key).is_err());
    let payload = SharePayload::decode(&sealed::open(&sealed_payload, &bob.exchange_key).unwrap()).unwrap();
    let entry_index = EntryIndex::load(&payload.entry_index_cid, &payload.key().unwrap(), &blobs)
        .await
        .unwrap();
    let links = entry_index.soft_links();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].name, "plan.md");
    assert_eq!(links[0].username, "alice");

    // the entry index is anchored in alice's private index under bob's share key
    let anchor = entry_index::namefilter(entry_index.bare_name_filter(), &shares[0].name);
    assert_eq!(inner.root.index.get(&anchor), Some(payload.entry_index_cid));
    assert_eq!(inner.root.index.len(), index_before + 1);
}

#[tokio::test]
async fn test_entry_index_anchored_under_first_recipient() {
    let (blobs, resolver) = common::setup_test_env().await;
    let alice = common::setup_user("alice", &blobs, &resolver).await;
    let bob = common::setup_user("bob", &blobs, &resolver).await;
    let carol = common::setup_user("carol", &blobs, &resolver).await;
    alice.fs.write("/a.txt", b"a").await.unwrap();
    let index_before = alice.fs.inner().await.root.index.len();

    alice
        .fs
        .share(
            &["/a.txt"],
            alice.share_options(ShareWith::Dids(vec![
                bob.exchange_key.did(),
                carol.exchange_key.did(),
            ])),
        )
        .await
        .unwrap();

    let inner = alice.fs.inner().await;
    let shares = inner.root.shares();
    assert_eq!(shares.len(), 2);
    let (payload, entry_index) = open_entry_index(&blobs, &shares[1].link, &carol.exchange_key).await;

    let owner = alice.root_key.did();
    let for_bob = ShareKey::create(1, &bob.exchange_key.did(), &owner);
    let for_carol = ShareKey::create(1, &carol.exchange_key.did(), &owner);
    let bare = entry_index.bare_name_filter();
    assert_eq!(
        inner.root.index.get(&entry_index::namefilter(bare, &for_bob)),
        Some(payload.entry_index_cid)
    );
    assert_eq!(inner.root.index.get(&entry_index::namefilter(bare, &for_carol)), None);
    assert_eq!(inner.root.index.len(), index_before + 1);
}

#[tokio::test]
async fn test_share_without_recipients_adds_no_anchor() {
    let (blobs, resolver) = common::setup_test_env().await;
    let alice = common::setup_user("alice", &blobs, &resolver).await;
    alice.fs.write("/a.txt", b"a").await.unwrap();
    let index_before = alice.fs.inner().await.root.index.len();

    alice
        .fs
        .share(&["/a.txt"], alice.share_options(ShareWith::Dids(vec![])))
        .await
        .unwrap();

    let inner = alice.fs.inner().await;
    assert!(inner.root.shares().is_empty());
    assert_eq!(inner.root.index.len(), index_before);
}

#[tokio::test]
async fn test_failed_share_leaves_root_untouched() {
    let (blobs, resolver) = common::setup_test_env().await;
    let alice = common::setup_user("alice", &blobs, &resolver).await;
    let bob = common::setup_user("bob", &blobs, &resolver).await;
    alice.fs.write("/a.txt", b"a").await.unwrap();
    let index_before = alice.fs.inner().await.root.index.entries();

    let result = alice
        .fs
        .share(
            &["/a.txt"],
            alice.share_options(ShareWith::Dids(vec![
                bob.exchange_key.did(),
                "did:key:zBogus".to_string(),
            ])),
        )
        .await;
    assert!(result.is_err());

    let inner = alice.fs.inner().await;
    assert_eq!(inner.root.index.entries(), index_before);
    assert!(inner.root.shares().is_empty());
    assert_eq!(inner.root.shared_counter(), 1);
}

#[tokio::test]
async fn test_repeated_shares_use_fresh_keys() {
    let (blobs, resolver) = common::setup_test_env().await;
    let alice = common::setup_user("alice", &blobs, &resolver).await;
    let bob = common::setup_user("bob", &blobs, &resolver).await;
    alice.fs.write("/a.txt", b"a").await.unwrap();

    let with = ShareWith::Dids(vec![bob.exchange_key.did()]);
    alice
        .fs
        .share(&["/a.txt"], alice.share_options(with.clone()))
        .await
        .unwrap();
    let second = alice
        .fs
        .share(&["/a.txt"], alice.share_options(with))
        .await
        .unwrap();
    assert_eq!(second.share_id, "2");

    let inner = alice.fs.inner().await;
    let shares = inner.root.shares();
    assert_eq!(shares.len(), 2);
    assert_ne!(shares[0].name, shares[1].name);
}

#[tokio::test]
async fn test_share_to_username_without_pretty_tree() {
    let (blobs, resolver) = common::setup_test_env().await;
    let alice = common::setup_user("alice", &blobs, &resolver).await;
    let nobody = common::setup_user("nobody", &blobs, &resolver).await;
    nobody.publish(&resolver).await;
    alice.fs.write("/a.txt", b"a").await.unwrap();

    let err = alice
        .fs
        .sharing()
        .list_exchange_dids("nobody")
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "This person's filesystem doesn't have a pretty tree."
    );

    let err = alice
        .fs
        .share(&["/a.txt"], alice.share_options(ShareWith::parse("ghost")))
        .await
        .unwrap_err();
    assert!(err
        .to_string()
        .contains("This person doesn't have a filesystem yet."));
    // a failed share leaves the counter alone
    assert_eq!(alice.fs.shared_counter().await, 1);
}

#[tokio::test]
async fn test_share_to_username_reaches_every_exchange_did() {
    let (blobs, resolver) = common::setup_test_env().await;
    let alice = common::setup_user("alice", &blobs, &resolver).await;
    let bob = common::setup_user("bob", &blobs, &resolver).await;
    let bob_laptop = ::common::crypto::SecretKey::generate();
    bob.fs.publish_exchange_did(&bob.exchange_key.did()).await;
    bob.fs.publish_exchange_did(&bob_laptop.did()).await;
    bob.publish(&resolver).await;

    alice.fs.write("/photos/cat.jpg", b"meow").await.unwrap();
    alice
        .fs
        .share(&["/photos"], alice.share_options(ShareWith::parse("bob")))
        .await
        .unwrap();

    let inner = alice.fs.inner().await;
    let names: Vec<ShareKey> = inner.root.shares().iter().map(|r| r.name.clone()).collect();
    assert_eq!(names.len(), 2);
    for did in [bob.exchange_key.did(), bob_laptop.did()] {
        assert!(names.contains(&ShareKey::create(1, &did, &alice.root_key.did())));
    }
}

#[tokio::test]
async fn test_recipient_reads_shared_file() {
    let (blobs, resolver) = common::setup_test_env().await;
    let alice = common::setup_user("alice", &blobs, &resolver).await;
    let bob = common::setup_user("bob", &blobs, &resolver).await;
    alice.fs.write("/docs/plan.md", b"the plan").await.unwrap();
    alice
        .fs
        .share(
            &["/docs/plan.md", "/docs"],
            alice.share_options(ShareWith::Dids(vec![bob.exchange_key.did()])),
        )
        .await
        .unwrap();
    alice.publish(&resolver).await;

    let received = bob
        .fs
        .sharing()
        .receive_share("alice", &alice.root_key.did(), 1, &bob.exchange_key)
        .await
        .unwrap();
    assert_eq!(received.len(), 2);

    let file = received
        .iter()
        .find(|(name, _)| name == "plan.md")
        .map(|(_, node)| node.clone())
        .unwrap();
    match file {
        PrivateNode::File(file) => assert_eq!(file.read(&blobs).await.unwrap(), b"the plan"),
        PrivateNode::Directory(_) => panic!("expected a file"),
    }
    assert!(received
        .iter()
        .any(|(name, node)| name == "docs" && !node.is_file()));

    // a counter that was never used has no share
    let missing = bob
        .fs
        .sharing()
        .receive_share("alice", &alice.root_key.did(), 2, &bob.exchange_key)
        .await;
    assert!(missing.is_err());
}

#[tokio::test]
async fn test_shared_file_follows_later_revisions() {
    let (blobs, resolver) = common::setup_test_env().await;
    let alice = common::setup_user("alice", &blobs, &resolver).await;
    let bob = common::setup_user("bob", &blobs, &resolver).await;
    alice.fs.write("/log.txt", b"v1").await.unwrap();
    alice
        .fs
        .share(
            &["/log.txt"],
            alice.share_options(ShareWith::Dids(vec![bob.exchange_key.did()])),
        )
        .await
        .unwrap();
    alice.fs.write("/log.txt", b"v2").await.unwrap();
    alice.publish(&resolver).await;

    let root_link = alice.fs.link().await.unwrap();
    let root = RootTree::load(&root_link, &blobs).await.unwrap();
    let record = root.shares()[0].clone();
    let received = bob
        .fs
        .sharing()
        .accept_share(&record.link, &bob.exchange_key, &root.index)
        .await
        .unwrap();
    match &received[0].1 {
        PrivateNode::File(file) => assert_eq!(file.read(&blobs).await.unwrap(), b"v2"),
        PrivateNode::Directory(_) => panic!("expected a file"),
    }
}
