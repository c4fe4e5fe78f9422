//! Resource collaborators behind the gate.
//!
//! Posts exercise ownership authorization; follow edges exercise conflict
//! reporting. Both are traits so a durable backend can replace the
//! in-memory doubles without touching the pipeline.

use std::{
    collections::{BTreeMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatehouse_storage::{IdentityId, StorageError, StorageResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Unique identifier of a [`Post`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub i64);

impl std::fmt::Display for PostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A resource with a single owning identity.
pub trait Owned: Send + Sync + 'static {
    /// The identity that owns this resource.
    fn owner(&self) -> IdentityId;
}

/// A user-authored post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Unique identifier.
    pub id: PostId,
    /// Author and owner.
    pub user_id: IdentityId,
    /// Title, at most [`MAX_TITLE_CHARS`] characters.
    pub title: String,
    /// Body, at most [`MAX_CONTENT_CHARS`] characters.
    pub content: String,
    /// Free-form tags.
    pub tags: Vec<String>,
    /// Incremented on every successful update.
    pub version: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Owned for Post {
    fn owner(&self) -> IdentityId {
        self.user_id
    }
}

/// Longest accepted title, in characters.
pub const MAX_TITLE_CHARS: usize = 100;

/// Longest accepted content, in characters.
pub const MAX_CONTENT_CHARS: usize = 1000;

/// Fields of a post supplied at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    /// Author.
    pub user_id: IdentityId,
    /// Title.
    pub title: String,
    /// Body.
    pub content: String,
    /// Tags.
    pub tags: Vec<String>,
}

/// Post persistence.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Persists a new post and returns it with its assigned id.
    async fn create_post(&self, post: NewPost) -> StorageResult<Post>;

    /// Returns the post with `id`, or [`StorageError::NotFound`].
    async fn get_post(&self, id: PostId) -> StorageResult<Post>;

    /// Writes `post` if its `version` still matches the stored one and
    /// returns the stored result with the version bumped.
    ///
    /// A stale version yields [`StorageError::Conflict`].
    async fn update_post(&self, post: &Post) -> StorageResult<Post>;

    /// Removes the post with `id`, or returns [`StorageError::NotFound`].
    async fn delete_post(&self, id: PostId) -> StorageResult<()>;
}

/// Follow-edge persistence.
#[async_trait]
pub trait FollowStore: Send + Sync {
    /// Records that `follower` follows `followee`.
    ///
    /// An existing edge yields [`StorageError::Conflict`].
    async fn follow(&self, follower: IdentityId, followee: IdentityId) -> StorageResult<()>;

    /// Removes the edge if present. Removing an absent edge succeeds.
    async fn unfollow(&self, follower: IdentityId, followee: IdentityId) -> StorageResult<()>;

    /// Whether `follower` currently follows `followee`.
    async fn is_following(&self, follower: IdentityId, followee: IdentityId) -> StorageResult<bool>;
}

/// In-memory [`PostStore`]. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryPostStore {
    posts: Arc<RwLock<BTreeMap<PostId, Post>>>,
    next_id: Arc<AtomicI64>,
}

impl MemoryPostStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored posts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.posts.read().len()
    }

    /// Returns `true` if no posts are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.posts.read().is_empty()
    }
}

#[async_trait]
impl PostStore for MemoryPostStore {
    #[tracing::instrument(skip(self, post), fields(user_id = %post.user_id))]
    async fn create_post(&self, post: NewPost) -> StorageResult<Post> {
        let id = PostId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let now = Utc::now();
        let post = Post {
            id,
            user_id: post.user_id,
            title: post.title,
            content: post.content,
            tags: post.tags,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.posts.write().insert(id, post.clone());
        Ok(post)
    }

    #[tracing::instrument(skip(self), fields(post_id = %id))]
    async fn get_post(&self, id: PostId) -> StorageResult<Post> {
        self.posts.read().get(&id).cloned().ok_or_else(|| StorageError::not_found("post", id))
    }

    #[tracing::instrument(skip(self, post), fields(post_id = %post.id, version = post.version))]
    async fn update_post(&self, post: &Post) -> StorageResult<Post> {
        let mut posts = self.posts.write();
        let stored = posts.get_mut(&post.id).ok_or_else(|| StorageError::not_found("post", post.id))?;
        if stored.version != post.version {
            return Err(StorageError::conflict(format!(
                "post {} was modified concurrently (expected version {}, found {})",
                post.id, post.version, stored.version
            )));
        }
        stored.title.clone_from(&post.title);
        stored.content.clone_from(&post.content);
        stored.tags.clone_from(&post.tags);
        stored.version += 1;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    #[tracing::instrument(skip(self), fields(post_id = %id))]
    async fn delete_post(&self, id: PostId) -> StorageResult<()> {
        self.posts.write().remove(&id).map(drop).ok_or_else(|| StorageError::not_found("post", id))
    }
}

/// In-memory [`FollowStore`]. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryFollowStore {
    edges: Arc<RwLock<HashSet<(IdentityId, IdentityId)>>>,
}

impl MemoryFollowStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FollowStore for MemoryFollowStore {
    #[tracing::instrument(skip(self))]
    async fn follow(&self, follower: IdentityId, followee: IdentityId) -> StorageResult<()> {
        if !self.edges.write().insert((follower, followee)) {
            return Err(StorageError::conflict(format!("{follower} already follows {followee}")));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn unfollow(&self, follower: IdentityId, followee: IdentityId) -> StorageResult<()> {
        self.edges.write().remove(&(follower, followee));
        Ok(())
    }

    async fn is_following(&self, follower: IdentityId, followee: IdentityId) -> StorageResult<bool> {
        Ok(self.edges.read().contains(&(follower, followee)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use gatehouse_storage::{assert_conflict, assert_not_found, assert_storage_ok};

    use super::*;

    fn new_post(user: i64) -> NewPost {
        NewPost {
            user_id: IdentityId(user),
            title: "hello".into(),
            content: "world".into(),
            tags: vec!["intro".into()],
        }
    }

    #[tokio::test]
    async fn test_create_assigns_sequential_ids() {
        let store = MemoryPostStore::new();
        let first = assert_storage_ok!(store.create_post(new_post(1)).await);
        let second = assert_storage_ok!(store.create_post(new_post(2)).await);
        assert_eq!(first.id, PostId(1));
        assert_eq!(second.id, PostId(2));
        assert_eq!(second.owner(), IdentityId(2));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_update_bumps_version_and_rejects_stale_writes() {
        let store = MemoryPostStore::new();
        let post = store.create_post(new_post(1)).await.unwrap();

        let mut edit = post.clone();
        edit.title = "edited".into();
        let updated = assert_storage_ok!(store.update_post(&edit).await);
        assert_eq!(updated.version, 1);
        assert_eq!(updated.title, "edited");

        // Same base version again: someone else already wrote.
        assert_conflict!(store.update_post(&edit).await);
        assert_eq!(store.get_post(post.id).await.unwrap().title, "edited");
    }

    #[tokio::test]
    async fn test_missing_post_is_not_found() {
        let store = MemoryPostStore::new();
        assert_not_found!(store.get_post(PostId(9)).await);
        assert_not_found!(store.delete_post(PostId(9)).await);

        let post = store.create_post(new_post(1)).await.unwrap();
        store.delete_post(post.id).await.unwrap();
        assert_not_found!(store.get_post(post.id).await);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_follow_conflicts() {
        let store = MemoryFollowStore::new();
        let (a, b) = (IdentityId(1), IdentityId(2));

        assert_storage_ok!(store.follow(a, b).await);
        assert_conflict!(store.follow(a, b).await);
        assert!(store.is_following(a, b).await.unwrap());
        assert!(!store.is_following(b, a).await.unwrap());

        store.unfollow(a, b).await.unwrap();
        store.unfollow(a, b).await.unwrap();
        assert!(!store.is_following(a, b).await.unwrap());
        store.follow(a, b).await.unwrap();
    }
}
