use std::path::PathBuf;

use serde_json::{Map, Value};
use tokio::fs;

use super::ProfileCache;
use crate::{
    error::{AppError, AppResult},
    models::{ExtractedPreferences, FeedbackEntry, FieldUpdate, Preferences, ProfileView, UserProfile},
};

/// Durable per-user preference store
///
/// One pretty-printed JSON document per user lives under `data_dir`. Every mutation
/// runs under the user's slot lock, is applied to a copy of the cached profile, and is
/// only committed to memory after the full document has been written. Writes go to a
/// temporary file that is renamed over the old document, so a failed write leaves the
/// previous version on disk and in memory.
pub struct ProfileStore {
    data_dir: PathBuf,
    cache: ProfileCache,
}

impl ProfileStore {
    /// Opens the store, creating the data directory if missing
    pub async fn open(data_dir: impl Into<PathBuf>, cache_capacity: usize) -> AppResult<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).await?;

        tracing::info!(data_dir = %data_dir.display(), "Profile store opened");

        Ok(Self {
            data_dir,
            cache: ProfileCache::new(cache_capacity),
        })
    }

    /// Path of the document backing `user_id`
    pub fn profile_path(&self, user_id: &str) -> AppResult<PathBuf> {
        validate_user_id(user_id)?;
        Ok(self.data_dir.join(format!("{}.json", user_id)))
    }

    /// Returns the user's profile, creating and persisting a default one for new users
    pub async fn load(&self, user_id: &str) -> AppResult<UserProfile> {
        self.read(user_id, UserProfile::clone).await
    }

    pub async fn add_genre(&self, user_id: &str, genre: &str) -> AppResult<bool> {
        let mut inserted = false;
        self.mutate(user_id, |profile| {
            inserted = profile.add_genre(genre);
            inserted
        })
        .await?;
        Ok(inserted)
    }

    pub async fn add_topic(&self, user_id: &str, topic: &str) -> AppResult<bool> {
        let mut inserted = false;
        self.mutate(user_id, |profile| {
            inserted = profile.add_topic(topic);
            inserted
        })
        .await?;
        Ok(inserted)
    }

    pub async fn add_author(&self, user_id: &str, author: &str) -> AppResult<bool> {
        let mut inserted = false;
        self.mutate(user_id, |profile| {
            inserted = profile.add_author(author);
            inserted
        })
        .await?;
        Ok(inserted)
    }

    /// Overwrites every recognized preference in `fields`, then persists once.
    ///
    /// Unrecognized keys and malformed values are skipped.
    pub async fn update_preferences(
        &self,
        user_id: &str,
        fields: Map<String, Value>,
    ) -> AppResult<Preferences> {
        let profile = self
            .mutate(user_id, |profile| {
                for (key, value) in fields {
                    match profile.preferences.apply_field(&key, value) {
                        FieldUpdate::Applied => {}
                        FieldUpdate::Unrecognized => {
                            tracing::debug!(user_id = %user_id, key = %key, "Ignoring unknown preference key");
                        }
                        FieldUpdate::Malformed => {
                            tracing::warn!(user_id = %user_id, key = %key, "Ignoring malformed preference value");
                        }
                    }
                }
                true
            })
            .await?;

        Ok(profile.preferences)
    }

    /// Folds preferences extracted from free text into the profile
    pub async fn merge_extracted(
        &self,
        user_id: &str,
        extracted: &ExtractedPreferences,
    ) -> AppResult<UserProfile> {
        self.mutate(user_id, |profile| {
            let mut changed = false;
            for genre in &extracted.genres {
                changed |= profile.add_genre(genre);
            }
            for topic in &extracted.topics {
                changed |= profile.add_topic(topic);
            }
            for author in &extracted.authors {
                changed |= profile.add_author(author);
            }
            if let Some(level) = extracted.reading_level {
                changed |= profile.preferences.reading_level != level;
                profile.preferences.reading_level = level;
            }
            changed
        })
        .await
    }

    /// Records a like or dislike, removing the item from the opposite list
    pub async fn add_feedback(
        &self,
        user_id: &str,
        item_id: &str,
        liked: bool,
        item_info: Option<Map<String, Value>>,
    ) -> AppResult<()> {
        if item_id.trim().is_empty() {
            return Err(AppError::Validation("item_id 不能为空".to_string()));
        }

        let entry = FeedbackEntry::new(item_id, item_info);
        self.mutate(user_id, |profile| {
            profile.add_feedback(entry, liked);
            true
        })
        .await?;

        tracing::info!(user_id = %user_id, item_id = %item_id, liked, "Feedback recorded");
        Ok(())
    }

    pub async fn increment_interaction(&self, user_id: &str) -> AppResult<UserProfile> {
        self.mutate(user_id, |profile| {
            profile.increment_interaction();
            true
        })
        .await
    }

    pub async fn add_reading_history(
        &self,
        user_id: &str,
        item: Map<String, Value>,
    ) -> AppResult<()> {
        self.mutate(user_id, |profile| {
            profile.add_reading_history(item);
            true
        })
        .await?;
        Ok(())
    }

    pub async fn summarize(&self, user_id: &str) -> AppResult<String> {
        self.read(user_id, UserProfile::summary).await
    }

    pub async fn is_new_user(&self, user_id: &str) -> AppResult<bool> {
        self.read(user_id, UserProfile::is_new_user).await
    }

    pub async fn profile_view(&self, user_id: &str) -> AppResult<ProfileView> {
        self.read(user_id, |profile| ProfileView::from(profile)).await
    }

    async fn read<F, R>(&self, user_id: &str, f: F) -> AppResult<R>
    where
        F: FnOnce(&UserProfile) -> R,
    {
        validate_user_id(user_id)?;
        let slot = self.cache.slot(user_id).await;
        let mut guard = slot.lock().await;
        let profile = self.ensure_loaded(user_id, &mut guard).await?;
        Ok(f(profile))
    }

    /// Runs one load-mutate-persist cycle under the user's lock.
    ///
    /// `f` returns whether it changed anything; unchanged profiles are not written.
    async fn mutate<F>(&self, user_id: &str, f: F) -> AppResult<UserProfile>
    where
        F: FnOnce(&mut UserProfile) -> bool,
    {
        validate_user_id(user_id)?;
        let slot = self.cache.slot(user_id).await;
        let mut guard = slot.lock().await;

        let mut draft = self.ensure_loaded(user_id, &mut guard).await?.clone();
        if !f(&mut draft) {
            return Ok(draft);
        }

        draft.touch();
        self.persist(&draft).await?;
        *guard = Some(draft.clone());

        Ok(draft)
    }

    async fn ensure_loaded<'a>(
        &self,
        user_id: &str,
        slot: &'a mut Option<UserProfile>,
    ) -> AppResult<&'a UserProfile> {
        let profile = match slot.take() {
            Some(cached) => cached,
            None => match self.read_from_disk(user_id).await? {
                Some(stored) => {
                    tracing::debug!(user_id = %user_id, "Loaded profile from disk");
                    stored
                }
                None => {
                    let fresh = UserProfile::new(user_id);
                    self.persist(&fresh).await?;
                    tracing::info!(user_id = %user_id, "Created new user profile");
                    fresh
                }
            },
        };

        Ok(slot.insert(profile))
    }

    async fn read_from_disk(&self, user_id: &str) -> AppResult<Option<UserProfile>> {
        let path = self.profile_path(user_id)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, profile: &UserProfile) -> AppResult<()> {
        let path = self.profile_path(&profile.user_id)?;
        let tmp_path = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(profile)?;

        let result = async {
            fs::write(&tmp_path, &bytes).await?;
            fs::rename(&tmp_path, &path).await
        }
        .await;

        if let Err(e) = result {
            tracing::error!(
                user_id = %profile.user_id,
                path = %path.display(),
                error = %e,
                "Failed to persist profile"
            );
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        Ok(())
    }
}

/// Rejects ids that would escape the data directory or collide with temp files
fn validate_user_id(user_id: &str) -> AppResult<()> {
    let invalid = user_id.trim().is_empty()
        || user_id.starts_with('.')
        || user_id.contains(['/', '\\', '\0']);

    if invalid {
        return Err(AppError::Validation(format!("无效的用户ID: {:?}", user_id)));
    }
    Ok(())
}
