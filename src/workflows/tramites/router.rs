use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::domain::{
    ArtifactRef, BecaId, Documento, EstadoTramite, HistorialEntry, PostulacionId, TipoDocumento,
    Tramite, TramiteId, UserId,
};
use super::export;
use super::machine::GuardViolation;
use super::repository::{CaseStore, DocumentStorage, NotificationPublisher};
use super::service::{TramiteWorkflowService, WorkflowError};

/// Router builder exposing the workflow operations as JSON endpoints.
pub fn tramite_router<S, N, F>(service: Arc<TramiteWorkflowService<S, N, F>>) -> Router
where
    S: CaseStore + 'static,
    N: NotificationPublisher + 'static,
    F: DocumentStorage + 'static,
{
    Router::new()
        .route("/api/v1/tramites", post(create_tramite_handler::<S, N, F>))
        .route(
            "/api/v1/tramites/pendientes",
            get(pendientes_handler::<S, N, F>),
        )
        .route(
            "/api/v1/tramites/codigo/:codigo",
            get(por_codigo_handler::<S, N, F>),
        )
        .route("/api/v1/tramites/:id", get(show_tramite_handler::<S, N, F>))
        .route(
            "/api/v1/tramites/:id/historial",
            get(historial_handler::<S, N, F>),
        )
        .route(
            "/api/v1/tramites/:id/transiciones",
            post(transition_handler::<S, N, F>),
        )
        .route(
            "/api/v1/tramites/:id/documentos",
            get(documentos_handler::<S, N, F>).post(register_documento_handler::<S, N, F>),
        )
        .route(
            "/api/v1/becas/:id/clasificacion",
            post(clasificacion_handler::<S, N, F>),
        )
        .route("/api/v1/becas/:id/ranking", post(ranking_handler::<S, N, F>))
        .route(
            "/api/v1/becas/:id/ranking/export",
            get(ranking_export_handler::<S, N, F>),
        )
        .route("/api/v1/becas/:id/resumen", get(resumen_handler::<S, N, F>))
        .with_state(service)
}

/// Case file snapshot exposed over the API.
#[derive(Debug, Clone, Serialize)]
pub struct TramiteView {
    pub id: TramiteId,
    pub codigo: String,
    pub estado_actual: &'static str,
    pub descripcion: &'static str,
    pub clasificado: bool,
    pub fecha_creacion: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fecha_clasificacion: Option<DateTime<Utc>>,
}

impl From<&Tramite> for TramiteView {
    fn from(tramite: &Tramite) -> Self {
        TramiteView {
            id: tramite.id,
            codigo: tramite.codigo.clone(),
            estado_actual: tramite.estado_actual.label(),
            descripcion: tramite.estado_actual.descripcion(),
            clasificado: tramite.clasificado,
            fecha_creacion: tramite.fecha_creacion,
            fecha_clasificacion: tramite.fecha_clasificacion,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistorialView {
    pub estado_anterior: Option<&'static str>,
    pub estado_nuevo: &'static str,
    pub observaciones: Option<String>,
    pub revisado_por: Option<UserId>,
    pub fecha: DateTime<Utc>,
}

impl From<&HistorialEntry> for HistorialView {
    fn from(entry: &HistorialEntry) -> Self {
        HistorialView {
            estado_anterior: entry.estado_anterior.map(EstadoTramite::label),
            estado_nuevo: entry.estado_nuevo.label(),
            observaciones: entry.observaciones.clone(),
            revisado_por: entry.revisado_por,
            fecha: entry.fecha,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentoView {
    pub tipo: &'static str,
    pub nombre: &'static str,
    pub nombre_archivo: String,
    pub validado: bool,
    pub tamanho_bytes: u64,
    pub fecha_subida: DateTime<Utc>,
}

impl From<&Documento> for DocumentoView {
    fn from(documento: &Documento) -> Self {
        DocumentoView {
            tipo: documento.tipo.label(),
            nombre: documento.tipo.nombre(),
            nombre_archivo: documento.nombre_archivo.clone(),
            validado: documento.validado,
            tamanho_bytes: documento.tamanho_bytes,
            fecha_subida: documento.fecha_subida,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateTramiteRequest {
    pub(crate) id_postulacion: PostulacionId,
    #[serde(default)]
    pub(crate) creado_por: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TransitionRequest {
    pub(crate) estado: EstadoTramite,
    #[serde(default)]
    pub(crate) observaciones: Option<String>,
    #[serde(default)]
    pub(crate) revisado_por: Option<UserId>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterDocumentoRequest {
    pub(crate) tipo: TipoDocumento,
    pub(crate) nombre_archivo: String,
    pub(crate) artifact_ref: String,
    #[serde(default)]
    pub(crate) tamanho_bytes: u64,
    #[serde(default)]
    pub(crate) subido_por: Option<UserId>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct BatchRequest {
    #[serde(default)]
    pub(crate) revisado_por: Option<UserId>,
}

fn error_response(error: WorkflowError) -> Response {
    let status = match &error {
        WorkflowError::TramiteNotFound(_)
        | WorkflowError::CodigoNotFound(_)
        | WorkflowError::PostulacionNotFound(_)
        | WorkflowError::BecaNotFound(_) => StatusCode::NOT_FOUND,
        WorkflowError::InvalidTransition { .. }
        | WorkflowError::Guard(_)
        | WorkflowError::SinCupos
        | WorkflowError::PuntajeInvalido(_) => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::Conflict | WorkflowError::PostulacionDuplicada => StatusCode::CONFLICT,
        WorkflowError::Storage(_) | WorkflowError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let mut payload = json!({ "error": error.to_string() });
    if let WorkflowError::Guard(GuardViolation::IncompleteDocuments { missing }) = &error {
        payload["faltantes"] = json!(missing
            .iter()
            .map(|tipo| tipo.label())
            .collect::<Vec<_>>());
    }
    (status, Json(payload)).into_response()
}

pub(crate) async fn create_tramite_handler<S, N, F>(
    State(service): State<Arc<TramiteWorkflowService<S, N, F>>>,
    Json(request): Json<CreateTramiteRequest>,
) -> Response
where
    S: CaseStore + 'static,
    N: NotificationPublisher + 'static,
    F: DocumentStorage + 'static,
{
    match service.create_tramite(request.id_postulacion, request.creado_por) {
        Ok(tramite) => (StatusCode::CREATED, Json(TramiteView::from(&tramite))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn show_tramite_handler<S, N, F>(
    State(service): State<Arc<TramiteWorkflowService<S, N, F>>>,
    Path(id): Path<u64>,
) -> Response
where
    S: CaseStore + 'static,
    N: NotificationPublisher + 'static,
    F: DocumentStorage + 'static,
{
    match service.tramite(TramiteId(id)) {
        Ok(tramite) => (StatusCode::OK, Json(TramiteView::from(&tramite))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn por_codigo_handler<S, N, F>(
    State(service): State<Arc<TramiteWorkflowService<S, N, F>>>,
    Path(codigo): Path<String>,
) -> Response
where
    S: CaseStore + 'static,
    N: NotificationPublisher + 'static,
    F: DocumentStorage + 'static,
{
    match service.tramite_por_codigo(&codigo) {
        Ok(tramite) => (StatusCode::OK, Json(TramiteView::from(&tramite))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn pendientes_handler<S, N, F>(
    State(service): State<Arc<TramiteWorkflowService<S, N, F>>>,
) -> Response
where
    S: CaseStore + 'static,
    N: NotificationPublisher + 'static,
    F: DocumentStorage + 'static,
{
    match service.pendientes_de_validacion() {
        Ok(tramites) => {
            let views: Vec<TramiteView> = tramites.iter().map(TramiteView::from).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn historial_handler<S, N, F>(
    State(service): State<Arc<TramiteWorkflowService<S, N, F>>>,
    Path(id): Path<u64>,
) -> Response
where
    S: CaseStore + 'static,
    N: NotificationPublisher + 'static,
    F: DocumentStorage + 'static,
{
    match service.historial(TramiteId(id)) {
        Ok(entries) => {
            let views: Vec<HistorialView> = entries.iter().map(HistorialView::from).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn documentos_handler<S, N, F>(
    State(service): State<Arc<TramiteWorkflowService<S, N, F>>>,
    Path(id): Path<u64>,
) -> Response
where
    S: CaseStore + 'static,
    N: NotificationPublisher + 'static,
    F: DocumentStorage + 'static,
{
    match service.documentos(TramiteId(id)) {
        Ok(documentos) => {
            let views: Vec<DocumentoView> = documentos.iter().map(DocumentoView::from).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn transition_handler<S, N, F>(
    State(service): State<Arc<TramiteWorkflowService<S, N, F>>>,
    Path(id): Path<u64>,
    Json(request): Json<TransitionRequest>,
) -> Response
where
    S: CaseStore + 'static,
    N: NotificationPublisher + 'static,
    F: DocumentStorage + 'static,
{
    match service.transition(
        TramiteId(id),
        request.estado,
        request.revisado_por,
        request.observaciones,
    ) {
        Ok(tramite) => (StatusCode::OK, Json(TramiteView::from(&tramite))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn register_documento_handler<S, N, F>(
    State(service): State<Arc<TramiteWorkflowService<S, N, F>>>,
    Path(id): Path<u64>,
    Json(request): Json<RegisterDocumentoRequest>,
) -> Response
where
    S: CaseStore + 'static,
    N: NotificationPublisher + 'static,
    F: DocumentStorage + 'static,
{
    match service.register_documento(
        TramiteId(id),
        request.tipo,
        ArtifactRef(request.artifact_ref),
        request.nombre_archivo,
        request.tamanho_bytes,
        request.subido_por,
    ) {
        Ok(documento) => {
            (StatusCode::CREATED, Json(DocumentoView::from(&documento))).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn clasificacion_handler<S, N, F>(
    State(service): State<Arc<TramiteWorkflowService<S, N, F>>>,
    Path(id): Path<u64>,
    request: Option<Json<BatchRequest>>,
) -> Response
where
    S: CaseStore + 'static,
    N: NotificationPublisher + 'static,
    F: DocumentStorage + 'static,
{
    let revisado_por = request.map(|Json(body)| body.revisado_por).unwrap_or(None);
    match service.start_clasificacion(BecaId(id), revisado_por) {
        Ok(tramites) => {
            let views: Vec<TramiteView> = tramites.iter().map(TramiteView::from).collect();
            (StatusCode::OK, Json(views)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn ranking_handler<S, N, F>(
    State(service): State<Arc<TramiteWorkflowService<S, N, F>>>,
    Path(id): Path<u64>,
    request: Option<Json<BatchRequest>>,
) -> Response
where
    S: CaseStore + 'static,
    N: NotificationPublisher + 'static,
    F: DocumentStorage + 'static,
{
    let revisado_por = request.map(|Json(body)| body.revisado_por).unwrap_or(None);
    match service.rank(BecaId(id), revisado_por) {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn ranking_export_handler<S, N, F>(
    State(service): State<Arc<TramiteWorkflowService<S, N, F>>>,
    Path(id): Path<u64>,
) -> Response
where
    S: CaseStore + 'static,
    N: NotificationPublisher + 'static,
    F: DocumentStorage + 'static,
{
    let result = match service.ranking_actual(BecaId(id)) {
        Ok(result) => result,
        Err(error) => return error_response(error),
    };
    match export::ranking_csv_string(&result) {
        Ok(csv) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
            csv,
        )
            .into_response(),
        Err(error) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

pub(crate) async fn resumen_handler<S, N, F>(
    State(service): State<Arc<TramiteWorkflowService<S, N, F>>>,
    Path(id): Path<u64>,
) -> Response
where
    S: CaseStore + 'static,
    N: NotificationPublisher + 'static,
    F: DocumentStorage + 'static,
{
    match service.resumen_beca(BecaId(id)) {
        Ok(resumen) => (StatusCode::OK, Json(resumen)).into_response(),
        Err(error) => error_response(error),
    }
}
