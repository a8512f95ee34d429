use std::str::FromStr;

use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::{
    defaults::DefaultGroups,
    error::ApiError,
    form::{GroupId, OptionId},
    listing::{list_cards, ProductCard},
    models::{GroupPatch, OptionPatch, ProductPatch},
    session::{EditSession, SessionId, SessionRegistry},
    store::{ProductStore, StoreError},
    upload::{ImageStore, UploadError, UploadLimit},
};

fn parse_id<T: FromStr>(raw: &str) -> Result<T, ApiError> {
    raw.parse().map_err(|_| ApiError::InvalidId(raw.to_string()))
}

fn session_view(registry: &SessionRegistry, id: SessionId) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(registry.view(id)?))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/admin")
            .route("/products", web::get().to(list_products))
            .route("/products/{id}", web::delete().to(delete_product))
            .route("/sessions", web::post().to(open_session))
            .route("/sessions/{sid}", web::get().to(get_session))
            .route("/sessions/{sid}", web::delete().to(cancel_session))
            .route("/sessions/{sid}/product", web::patch().to(patch_product))
            .route("/sessions/{sid}/image", web::post().to(upload_image))
            .route("/sessions/{sid}/submit", web::post().to(submit_session))
            .route("/sessions/{sid}/groups", web::post().to(add_group))
            .route("/sessions/{sid}/groups/defaults", web::post().to(apply_default_groups))
            .route("/sessions/{sid}/groups/{gid}", web::patch().to(update_group))
            .route("/sessions/{sid}/groups/{gid}", web::delete().to(remove_group))
            .route("/sessions/{sid}/groups/{gid}/options", web::post().to(add_option))
            .route("/sessions/{sid}/groups/{gid}/options/{oid}", web::patch().to(update_option))
            .route("/sessions/{sid}/groups/{gid}/options/{oid}", web::delete().to(remove_option)),
    );
}

pub async fn list_products(store: web::Data<dyn ProductStore>) -> Result<HttpResponse, ApiError> {
    let cards = list_cards(store.get_ref()).await?;
    Ok(HttpResponse::Ok().json(cards))
}

pub async fn delete_product(
    store: web::Data<dyn ProductStore>,
    id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let object_id: ObjectId = parse_id(&id)?;
    store.delete(&object_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct OpenSessionRequest {
    #[serde(default)]
    pub product_id: Option<String>,
}

pub async fn open_session(
    registry: web::Data<SessionRegistry>,
    store: web::Data<dyn ProductStore>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    // Only an absent body means "create"; anything else must parse.
    let request: OpenSessionRequest = if body.iter().all(u8::is_ascii_whitespace) {
        OpenSessionRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| {
            error!("Malformed open-session request: {}", e);
            ApiError::BadRequest(e.to_string())
        })?
    };

    let session = match request.product_id {
        Some(raw) => {
            let id: ObjectId = parse_id(&raw)?;
            let product = store.get(&id).await?.ok_or(StoreError::NotFound(id))?;
            EditSession::for_edit(&product)?
        }
        None => EditSession::for_create(),
    };

    let sid = registry.open(session);
    Ok(HttpResponse::Created().json(registry.view(sid)?))
}

pub async fn get_session(
    registry: web::Data<SessionRegistry>,
    sid: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    session_view(&registry, parse_id(&sid)?)
}

pub async fn cancel_session(
    registry: web::Data<SessionRegistry>,
    sid: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    registry.close(parse_id(&sid)?)?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn patch_product(
    registry: web::Data<SessionRegistry>,
    sid: web::Path<String>,
    patch: web::Json<ProductPatch>,
) -> Result<HttpResponse, ApiError> {
    let sid = parse_id(&sid)?;
    registry.with_session(sid, |s| s.form_mut().apply_patch(patch.into_inner()))?;
    session_view(&registry, sid)
}

pub async fn add_group(
    registry: web::Data<SessionRegistry>,
    sid: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let sid = parse_id(&sid)?;
    registry.with_session(sid, |s| s.form_mut().add_group())?;
    session_view(&registry, sid)
}

pub async fn apply_default_groups(
    registry: web::Data<SessionRegistry>,
    defaults: web::Data<DefaultGroups>,
    sid: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let sid = parse_id(&sid)?;
    registry.with_session(sid, |s| s.form_mut().apply_default_groups(defaults.groups()))?;
    session_view(&registry, sid)
}

pub async fn update_group(
    registry: web::Data<SessionRegistry>,
    path: web::Path<(String, String)>,
    patch: web::Json<GroupPatch>,
) -> Result<HttpResponse, ApiError> {
    let (sid, gid) = path.into_inner();
    let sid = parse_id(&sid)?;
    let gid: GroupId = parse_id(&gid)?;
    registry.with_session(sid, |s| s.form_mut().update_group(gid, patch.into_inner()))??;
    session_view(&registry, sid)
}

pub async fn remove_group(
    registry: web::Data<SessionRegistry>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (sid, gid) = path.into_inner();
    let sid = parse_id(&sid)?;
    let gid: GroupId = parse_id(&gid)?;
    registry.with_session(sid, |s| s.form_mut().remove_group(gid))??;
    session_view(&registry, sid)
}

pub async fn add_option(
    registry: web::Data<SessionRegistry>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (sid, gid) = path.into_inner();
    let sid = parse_id(&sid)?;
    let gid: GroupId = parse_id(&gid)?;
    registry.with_session(sid, |s| s.form_mut().add_option(gid))??;
    session_view(&registry, sid)
}

pub async fn update_option(
    registry: web::Data<SessionRegistry>,
    path: web::Path<(String, String, String)>,
    patch: web::Json<OptionPatch>,
) -> Result<HttpResponse, ApiError> {
    let (sid, gid, oid) = path.into_inner();
    let sid = parse_id(&sid)?;
    let gid: GroupId = parse_id(&gid)?;
    let oid: OptionId = parse_id(&oid)?;
    registry.with_session(sid, |s| s.form_mut().update_option(gid, oid, patch.into_inner()))??;
    session_view(&registry, sid)
}

pub async fn remove_option(
    registry: web::Data<SessionRegistry>,
    path: web::Path<(String, String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (sid, gid, oid) = path.into_inner();
    let sid = parse_id(&sid)?;
    let gid: GroupId = parse_id(&gid)?;
    let oid: OptionId = parse_id(&oid)?;
    registry.with_session(sid, |s| s.form_mut().remove_option(gid, oid))??;
    session_view(&registry, sid)
}

pub async fn upload_image(
    registry: web::Data<SessionRegistry>,
    images: web::Data<dyn ImageStore>,
    limit: web::Data<UploadLimit>,
    sid: web::Path<String>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let sid = parse_id(&sid)?;
    let bad_multipart = |e: actix_multipart::MultipartError| ApiError::BadRequest(e.to_string());

    let mut file: Option<(String, Vec<u8>)> = None;
    while let Some(mut field) = payload.try_next().await.map_err(bad_multipart)? {
        if field.name() != "file" {
            continue;
        }
        let file_name = field
            .content_disposition()
            .get_filename()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("missing file name".to_string()))?;

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(bad_multipart)? {
            let size = bytes.len() + chunk.len();
            if size > limit.0 {
                error!("Rejecting upload {} for session {}: over {} bytes", file_name, sid, limit.0);
                return Err(UploadError::TooLarge { size, max: limit.0 }.into());
            }
            bytes.extend_from_slice(&chunk);
        }
        file = Some((file_name, bytes));
        break;
    }

    let (file_name, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("no 'file' field in upload".to_string()))?;
    debug!("Received image {} ({} bytes) for session {}", file_name, bytes.len(), sid);

    registry.attach_image(sid, images.get_ref(), bytes, &file_name).await?;
    session_view(&registry, sid)
}

pub async fn submit_session(
    registry: web::Data<SessionRegistry>,
    store: web::Data<dyn ProductStore>,
    sid: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let sid = parse_id(&sid)?;
    let product = registry.submit(sid, store.get_ref()).await?;
    info!("Session {} submitted", sid);
    Ok(HttpResponse::Ok().json(ProductCard::from(&product)))
}
