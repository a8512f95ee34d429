//! Editing sessions: one per open create/edit modal.
//!
//! Submit and image upload are split into `begin_*` / `finish_*` so no lock
//! is held while a collaborator call is pending. The form stays editable in
//! between; a second submit (or upload) is rejected until the first one
//! finishes.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use mongodb::bson::oid::ObjectId;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};
use validator::Validate;

use crate::form::{form_id, FormError, ProductForm};
use crate::models::{Product, ProductFormData};
use crate::store::{ProductStore, StoreError};
use crate::upload::{ImageStore, UploadError, PRODUCTS_NAMESPACE};

form_id!(SessionId);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("editing session {0} not found")]
    NotFound(SessionId),
    #[error("product has no identifier")]
    NotPersisted,
    #[error("a {0} is already in progress")]
    Busy(&'static str),
    #[error(transparent)]
    Form(#[from] FormError),
    #[error("invalid product: {0}")]
    Invalid(#[from] validator::ValidationErrors),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Upload(#[from] UploadError),
}

/// A whole-product save captured by [`EditSession::begin_submit`].
#[derive(Debug, Clone)]
pub struct PendingSubmit {
    pub target: Option<ObjectId>,
    pub data: ProductFormData,
}

impl PendingSubmit {
    pub async fn send(&self, store: &dyn ProductStore) -> Result<Product, StoreError> {
        match &self.target {
            Some(id) => store.update(id, &self.data).await,
            None => store.create(&self.data).await,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EditSession {
    editing: Option<ObjectId>,
    form: ProductForm,
    saving: bool,
    uploading: bool,
}

impl EditSession {
    pub fn for_create() -> Self {
        EditSession::default()
    }

    pub fn for_edit(product: &Product) -> Result<Self, SessionError> {
        let id = product.id.ok_or(SessionError::NotPersisted)?;
        Ok(EditSession {
            editing: Some(id),
            form: ProductForm::from_product(product),
            ..Default::default()
        })
    }

    pub fn editing(&self) -> Option<ObjectId> {
        self.editing
    }

    pub fn form(&self) -> &ProductForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut ProductForm {
        &mut self.form
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading
    }

    pub fn begin_submit(&mut self) -> Result<PendingSubmit, SessionError> {
        if self.saving {
            return Err(SessionError::Busy("save"));
        }
        let data = self.form.to_form_data();
        if let Err(errors) = data.validate() {
            error!("Refusing to save invalid product: {}", errors);
            return Err(errors.into());
        }
        self.saving = true;
        Ok(PendingSubmit { target: self.editing, data })
    }

    /// On success the session is back to create defaults; on failure the
    /// form is left as it was so the operator can retry.
    pub fn finish_submit(&mut self, result: Result<Product, StoreError>) -> Result<Product, SessionError> {
        self.saving = false;
        match result {
            Ok(product) => {
                self.editing = None;
                self.form = ProductForm::default();
                Ok(product)
            }
            Err(e) => {
                error!("Failed to save product: {}", e);
                Err(e.into())
            }
        }
    }

    pub async fn submit(&mut self, store: &dyn ProductStore) -> Result<Product, SessionError> {
        let pending = self.begin_submit()?;
        let result = pending.send(store).await;
        self.finish_submit(result)
    }

    pub fn begin_upload(&mut self) -> Result<(), SessionError> {
        if self.uploading {
            return Err(SessionError::Busy("upload"));
        }
        self.uploading = true;
        Ok(())
    }

    pub fn finish_upload(&mut self, result: Result<String, UploadError>) -> Result<String, SessionError> {
        self.uploading = false;
        match result {
            Ok(url) => {
                self.form.set_image_url(url.clone());
                Ok(url)
            }
            Err(e) => {
                error!("Failed to upload image: {}", e);
                Err(e.into())
            }
        }
    }

    pub async fn attach_image(
        &mut self,
        images: &dyn ImageStore,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<String, SessionError> {
        self.begin_upload()?;
        let result = images.upload(bytes, file_name, PRODUCTS_NAMESPACE).await;
        self.finish_upload(result)
    }
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: SessionId,
    pub editing: Option<String>,
    pub saving: bool,
    pub uploading: bool,
    pub form: ProductForm,
}

/// Sessions idle for longer than this are dropped.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 30 * 60;

struct TrackedSession {
    session: EditSession,
    touched: DateTime<Utc>,
}

pub struct SessionRegistry {
    sessions: DashMap<SessionId, TrackedSession>,
    ttl: Duration,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        SessionRegistry::new(Duration::seconds(DEFAULT_SESSION_TTL_SECS))
    }
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        SessionRegistry {
            sessions: DashMap::new(),
            ttl,
        }
    }

    pub fn open(&self, session: EditSession) -> SessionId {
        self.evict_idle();
        let id = SessionId::new();
        debug!("Opening editing session {} (editing: {:?})", id, session.editing);
        self.sessions.insert(id, TrackedSession { session, touched: Utc::now() });
        id
    }

    pub fn close(&self, id: SessionId) -> Result<(), SessionError> {
        debug!("Closing editing session {}", id);
        self.sessions.remove(&id).map(|_| ()).ok_or(SessionError::NotFound(id))
    }

    /// Drops every session untouched for longer than the TTL. Returns how
    /// many were dropped.
    pub fn evict_idle(&self) -> usize {
        let cutoff = Utc::now() - self.ttl;
        let before = self.sessions.len();
        self.sessions.retain(|id, tracked| {
            let keep = tracked.touched >= cutoff;
            if !keep {
                debug!("Evicting idle editing session {}", id);
            }
            keep
        });
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            info!("Evicted {} idle editing sessions", evicted);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Runs `f` against the session and marks it as touched. An expired
    /// session is dropped and reported as not found. The entry guard is
    /// released before returning, so `f` must not await.
    pub fn with_session<R>(
        &self,
        id: SessionId,
        f: impl FnOnce(&mut EditSession) -> R,
    ) -> Result<R, SessionError> {
        let now = Utc::now();
        {
            let mut entry = self.sessions.get_mut(&id).ok_or(SessionError::NotFound(id))?;
            if now - entry.touched <= self.ttl {
                entry.touched = now;
                return Ok(f(&mut entry.session));
            }
        }
        debug!("Editing session {} expired", id);
        self.sessions.remove(&id);
        Err(SessionError::NotFound(id))
    }

    #[cfg(test)]
    fn backdate(&self, id: SessionId, by: Duration) {
        if let Some(mut entry) = self.sessions.get_mut(&id) {
            entry.touched = entry.touched - by;
        }
    }

    pub fn view(&self, id: SessionId) -> Result<SessionView, SessionError> {
        self.with_session(id, |s| SessionView {
            id,
            editing: s.editing.map(|oid| oid.to_hex()),
            saving: s.saving,
            uploading: s.uploading,
            form: s.form.clone(),
        })
    }

    /// Saves the session's product and closes the session on success.
    pub async fn submit(&self, id: SessionId, store: &dyn ProductStore) -> Result<Product, SessionError> {
        let pending = self.with_session(id, |s| s.begin_submit())??;
        let result = pending.send(store).await;

        // A session cancelled while the save was in flight reports NotFound
        // even though the product was stored.
        let product = self.with_session(id, |s| s.finish_submit(result))??;
        self.sessions.remove(&id);
        info!("Editing session {} saved product {:?}", id, product.id);
        Ok(product)
    }

    pub async fn attach_image(
        &self,
        id: SessionId,
        images: &dyn ImageStore,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> Result<String, SessionError> {
        self.with_session(id, |s| s.begin_upload())??;
        let result = images.upload(bytes, file_name, PRODUCTS_NAMESPACE).await;
        self.with_session(id, |s| s.finish_upload(result))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::NEW_GROUP_NAME;
    use crate::models::{Category, ComplementGroup, GroupPatch, ProductPatch};
    use crate::store::memory::MemoryProductStore;
    use crate::upload::memory::MemoryImageStore;

    fn named(session: &mut EditSession, name: &str) {
        session.form_mut().apply_patch(ProductPatch {
            name: Some(name.to_string()),
            price: Some(14.9),
            ..Default::default()
        });
    }

    fn persisted(name: &str) -> Product {
        Product::from_form_data(
            Some(ObjectId::new()),
            ProductFormData {
                name: name.to_string(),
                category: Category::Milkshake,
                price: 20.0,
                original_price: Some(25.0),
                description: "Milkshake de morango".to_string(),
                image_url: Some("https://cdn.test/products/old.png".to_string()),
                is_active: true,
                is_weighable: false,
                price_per_gram: None,
                has_complements: true,
                complement_groups: vec![ComplementGroup {
                    name: "Calda".to_string(),
                    required: false,
                    min_items: 0,
                    max_items: 1,
                    options: vec![],
                }],
                sizes: None,
            },
        )
    }

    #[actix_web::test]
    async fn submit_without_target_creates_once_and_resets() {
        let store = MemoryProductStore::default();
        let mut session = EditSession::for_create();
        named(&mut session, "Açaí 700ml");
        let gid = session.form_mut().add_group();
        session
            .form_mut()
            .update_group(gid, GroupPatch { required: Some(true), min_items: Some(1), ..Default::default() })
            .unwrap();
        let expected = session.form().to_form_data();

        let product = session.submit(&store).await.unwrap();

        let created = store.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0], expected);
        assert!(store.updated.lock().unwrap().is_empty());
        assert!(product.id.is_some());
        assert_eq!(product.complement_groups[0].name, NEW_GROUP_NAME);
        assert_eq!(session.editing(), None);
        assert_eq!(session.form(), &ProductForm::default());
        assert!(!session.is_saving());
    }

    #[actix_web::test]
    async fn submit_with_target_replaces_whole_product() {
        let original = persisted("Milkshake");
        let id = original.id.unwrap();
        let store = MemoryProductStore::with_products(vec![original.clone()]);
        let mut session = EditSession::for_edit(&original).unwrap();
        named(&mut session, "Milkshake 500ml");

        let saved = session.submit(&store).await.unwrap();

        assert_eq!(saved.id, Some(id));
        assert_eq!(saved.name, "Milkshake 500ml");
        assert_eq!(saved.complement_groups, original.complement_groups);
        let updated = store.updated.lock().unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].0, id);
        assert!(store.created.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn failed_submit_keeps_form_for_retry() {
        let store = MemoryProductStore::default();
        store.set_failing(true);
        let mut session = EditSession::for_create();
        named(&mut session, "Sorvete");
        let before = session.form().clone();

        let err = session.submit(&store).await.unwrap_err();

        assert!(matches!(err, SessionError::Store(StoreError::Unavailable(_))));
        assert_eq!(session.form(), &before);
        assert!(!session.is_saving());

        store.set_failing(false);
        assert!(session.submit(&store).await.is_ok());
        assert_eq!(store.created.lock().unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn invalid_form_never_reaches_store() {
        let store = MemoryProductStore::default();
        let mut session = EditSession::for_create();
        named(&mut session, "Combo");
        let gid = session.form_mut().add_group();
        session
            .form_mut()
            .update_group(gid, GroupPatch { min_items: Some(3), ..Default::default() })
            .unwrap();

        let err = session.submit(&store).await.unwrap_err();

        assert!(matches!(err, SessionError::Invalid(_)));
        assert!(store.created.lock().unwrap().is_empty());
        assert!(!session.is_saving());
    }

    #[test]
    fn second_submit_while_pending_is_busy() {
        let mut session = EditSession::for_create();
        named(&mut session, "Vitamina");

        let pending = session.begin_submit().unwrap();
        assert!(pending.target.is_none());
        assert!(matches!(session.begin_submit(), Err(SessionError::Busy("save"))));

        // still editable while the save is in flight
        session.form_mut().add_group();
        assert_eq!(session.form().groups().len(), 1);
    }

    #[test]
    fn edit_requires_persisted_product() {
        let mut product = persisted("Água");
        product.id = None;
        assert!(matches!(EditSession::for_edit(&product), Err(SessionError::NotPersisted)));
    }

    #[actix_web::test]
    async fn attach_image_sets_reference() {
        let images = MemoryImageStore::default();
        let mut session = EditSession::for_create();

        let url = session.attach_image(&images, vec![1, 2, 3], "copo.png").await.unwrap();

        assert_eq!(url, "https://cdn.test/products/copo.png");
        assert_eq!(session.form().image_url.as_deref(), Some(url.as_str()));
        let uploads = images.uploads.lock().unwrap();
        assert_eq!(uploads[0], ("copo.png".to_string(), PRODUCTS_NAMESPACE.to_string(), 3));
        assert!(!session.is_uploading());
    }

    #[actix_web::test]
    async fn failed_upload_leaves_prior_image() {
        let images = MemoryImageStore::failing();
        let product = persisted("Milkshake");
        let mut session = EditSession::for_edit(&product).unwrap();

        let err = session.attach_image(&images, vec![9], "novo.png").await.unwrap_err();

        assert!(matches!(err, SessionError::Upload(_)));
        assert_eq!(session.form().image_url, product.image_url);
        assert!(!session.is_uploading());
    }

    #[actix_web::test]
    async fn registry_closes_session_after_save() {
        let registry = SessionRegistry::default();
        let store = MemoryProductStore::default();
        let mut session = EditSession::for_create();
        named(&mut session, "Brownie");
        let id = registry.open(session);

        registry.submit(id, &store).await.unwrap();

        assert!(registry.is_empty());
        assert!(matches!(registry.view(id), Err(SessionError::NotFound(_))));
    }

    #[actix_web::test]
    async fn registry_keeps_session_after_failed_save() {
        let registry = SessionRegistry::default();
        let store = MemoryProductStore::default();
        store.set_failing(true);
        let mut session = EditSession::for_create();
        named(&mut session, "Brownie");
        let id = registry.open(session);

        assert!(registry.submit(id, &store).await.is_err());

        let view = registry.view(id).unwrap();
        assert_eq!(view.form.name, "Brownie");
        assert!(!view.saving);
    }

    #[test]
    fn unknown_session_is_not_found() {
        let registry = SessionRegistry::default();
        let id = SessionId::new();
        assert!(matches!(registry.close(id), Err(SessionError::NotFound(_))));
        assert!(matches!(registry.with_session(id, |_| ()), Err(SessionError::NotFound(_))));
    }

    #[test]
    fn second_upload_while_pending_is_busy() {
        let mut session = EditSession::for_create();

        session.begin_upload().unwrap();
        assert!(matches!(session.begin_upload(), Err(SessionError::Busy("upload"))));

        session.finish_upload(Ok("https://cdn.test/products/a.png".to_string())).unwrap();
        assert!(!session.is_uploading());
        assert!(session.begin_upload().is_ok());
    }

    #[test]
    fn idle_session_expires() {
        let registry = SessionRegistry::new(Duration::minutes(10));
        let id = registry.open(EditSession::for_create());

        registry.backdate(id, Duration::minutes(11));

        assert!(matches!(registry.view(id), Err(SessionError::NotFound(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn open_evicts_idle_sessions_only() {
        let registry = SessionRegistry::new(Duration::minutes(10));
        let stale = registry.open(EditSession::for_create());
        let fresh = registry.open(EditSession::for_create());
        registry.backdate(stale, Duration::minutes(11));
        registry.backdate(fresh, Duration::minutes(9));

        let newest = registry.open(EditSession::for_create());

        assert_eq!(registry.len(), 2);
        assert!(registry.view(fresh).is_ok());
        assert!(registry.view(newest).is_ok());
        assert!(matches!(registry.view(stale), Err(SessionError::NotFound(_))));
    }

    #[test]
    fn activity_keeps_session_alive() {
        let registry = SessionRegistry::new(Duration::minutes(10));
        let id = registry.open(EditSession::for_create());
        registry.backdate(id, Duration::minutes(9));

        registry.with_session(id, |s| s.form_mut().add_group()).unwrap();
        registry.backdate(id, Duration::minutes(9));

        assert_eq!(registry.evict_idle(), 0);
        assert_eq!(registry.view(id).unwrap().form.groups().len(), 1);
    }
}
