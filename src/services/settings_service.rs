use std::{future::Future, sync::Arc};

use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use tokio::sync::RwLock;

use crate::{
    audit,
    dto::settings::UpdateSettingsRequest,
    entity::hotel_settings::{ActiveModel as SettingsActive, Entity as Settings, Model as SettingsModel},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::HotelSettings,
    response::ApiResponse,
    state::AppState,
};

const SETTINGS_ID: i32 = 1;

/// In-memory copy of the settings row. Filled on first read, cleared on write.
#[derive(Clone, Default)]
pub struct SettingsCache {
    inner: Arc<RwLock<Option<HotelSettings>>>,
}

impl SettingsCache {
    pub async fn get(&self) -> Option<HotelSettings> {
        self.inner.read().await.clone()
    }

    pub async fn invalidate(&self) {
        *self.inner.write().await = None;
    }

    /// Cached value, or the result of `load` stored while the write lock is held.
    pub async fn get_or_load<F, Fut>(&self, load: F) -> AppResult<HotelSettings>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<HotelSettings>>,
    {
        if let Some(cached) = self.get().await {
            return Ok(cached);
        }
        let mut slot = self.inner.write().await;
        if let Some(cached) = slot.as_ref() {
            return Ok(cached.clone());
        }
        let settings = load().await?;
        *slot = Some(settings.clone());
        Ok(settings)
    }

    /// Runs `write` under the write lock and caches what it saved.
    pub async fn replace_with<F, Fut>(&self, write: F) -> AppResult<HotelSettings>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<HotelSettings>>,
    {
        let mut slot = self.inner.write().await;
        let settings = write().await?;
        *slot = Some(settings.clone());
        Ok(settings)
    }
}

/// Current settings, read through the cache.
pub async fn load_settings(state: &AppState) -> AppResult<HotelSettings> {
    state
        .settings
        .get_or_load(|| async {
            let model = Settings::find_by_id(SETTINGS_ID)
                .one(&state.orm)
                .await?
                .ok_or_else(|| AppError::Internal(anyhow::anyhow!("hotel_settings row is missing")))?;
            tracing::debug!("hotel settings cached");
            Ok::<_, AppError>(settings_from_entity(model))
        })
        .await
}

pub async fn get_settings(state: &AppState) -> AppResult<ApiResponse<HotelSettings>> {
    let settings = load_settings(state).await?;
    Ok(ApiResponse::ok("Settings", settings))
}

pub async fn update_settings(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateSettingsRequest,
) -> AppResult<ApiResponse<HotelSettings>> {
    ensure_admin(user)?;

    let existing = Settings::find_by_id(SETTINGS_ID)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("hotel_settings row is missing")))?;

    let mut active: SettingsActive = existing.into();
    if let Some(name) = payload.hotel_name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::BadRequest("Hotel name is required".into()));
        }
        active.hotel_name = Set(name);
    }
    if let Some(tagline) = payload.tagline {
        active.tagline = Set(optional(tagline));
    }
    if let Some(address) = payload.address {
        active.address = Set(optional(address));
    }
    if let Some(phone) = payload.phone {
        active.phone = Set(optional(phone));
    }
    if let Some(email) = payload.email {
        active.email = Set(optional(email));
    }
    if let Some(currency) = payload.currency {
        active.currency = Set(validate_currency(&currency)?);
    }
    if let Some(time) = payload.check_in_time {
        active.check_in_time = Set(validate_time(&time)?);
    }
    if let Some(time) = payload.check_out_time {
        active.check_out_time = Set(validate_time(&time)?);
    }
    active.updated_at = Set(Utc::now().into());

    let orm = &state.orm;
    let settings = state
        .settings
        .replace_with(|| async move {
            let model = active.update(orm).await?;
            Ok::<_, AppError>(settings_from_entity(model))
        })
        .await?;

    audit::record(
        &state.pool,
        Some(user.user_id),
        "settings_update",
        "hotel_settings",
        serde_json::json!({ "hotel_name": settings.hotel_name }),
    )
    .await;

    Ok(ApiResponse::ok("Settings updated", settings))
}

pub async fn invalidate_cache(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_admin(user)?;
    state.settings.invalidate().await;
    Ok(ApiResponse::ok("Settings cache cleared", serde_json::json!({})))
}

fn optional(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn validate_currency(code: &str) -> AppResult<String> {
    let code = code.trim().to_uppercase();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(AppError::BadRequest("Currency must be a 3-letter code".into()));
    }
    Ok(code)
}

fn validate_time(value: &str) -> AppResult<String> {
    let value = value.trim();
    chrono::NaiveTime::parse_from_str(value, "%H:%M")
        .map(|t| t.format("%H:%M").to_string())
        .map_err(|_| AppError::BadRequest(format!("Invalid time {value}, expected HH:MM")))
}

fn settings_from_entity(model: SettingsModel) -> HotelSettings {
    HotelSettings {
        hotel_name: model.hotel_name,
        tagline: model.tagline,
        address: model.address,
        phone: model.phone,
        email: model.email,
        currency: model.currency,
        check_in_time: model.check_in_time,
        check_out_time: model.check_out_time,
        updated_at: model.updated_at.with_timezone(&Utc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HotelSettings {
        HotelSettings {
            hotel_name: "Harbour View".into(),
            tagline: None,
            address: None,
            phone: None,
            email: None,
            currency: "USD".into(),
            check_in_time: "14:00".into(),
            check_out_time: "12:00".into(),
            updated_at: Utc::now(),
        }
    }

    fn named(name: &str) -> HotelSettings {
        HotelSettings {
            hotel_name: name.into(),
            ..sample()
        }
    }

    #[tokio::test]
    async fn cache_is_shared_between_clones_and_cleared_on_invalidate() {
        let cache = SettingsCache::default();
        let other = cache.clone();
        assert!(cache.get().await.is_none());

        cache.get_or_load(|| async { Ok(sample()) }).await.unwrap();
        assert_eq!(other.get().await.unwrap().hotel_name, "Harbour View");

        let again = other
            .get_or_load(|| async { Err::<HotelSettings, _>(AppError::NotFound) })
            .await
            .unwrap();
        assert_eq!(again.hotel_name, "Harbour View");

        other.invalidate().await;
        assert!(cache.get().await.is_none());
    }

    #[tokio::test]
    async fn slow_load_cannot_overwrite_a_newer_write() {
        let cache = SettingsCache::default();
        let (release, wait) = tokio::sync::oneshot::channel::<()>();

        let loading = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_load(|| async move {
                        wait.await.ok();
                        Ok(named("Stale"))
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        let writing = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.replace_with(|| async { Ok(named("Fresh")) }).await })
        };
        tokio::task::yield_now().await;
        release.send(()).unwrap();

        loading.await.unwrap().unwrap();
        writing.await.unwrap().unwrap();
        assert_eq!(cache.get().await.unwrap().hotel_name, "Fresh");
    }

    #[tokio::test]
    async fn failed_write_keeps_the_cached_value() {
        let cache = SettingsCache::default();
        cache.replace_with(|| async { Ok(sample()) }).await.unwrap();
        let result = cache
            .replace_with(|| async { Err::<HotelSettings, _>(AppError::BadRequest("nope".into())) })
            .await;
        assert!(result.is_err());
        assert_eq!(cache.get().await.unwrap().hotel_name, "Harbour View");
    }

    #[test]
    fn validates_currency_and_times() {
        assert_eq!(validate_currency(" eur ").unwrap(), "EUR");
        assert!(validate_currency("EURO").is_err());
        assert_eq!(validate_time("9:30").unwrap(), "09:30");
        assert!(validate_time("25:00").is_err());
    }
}
