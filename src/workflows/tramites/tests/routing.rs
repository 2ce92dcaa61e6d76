use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use super::common::*;
use crate::workflows::tramites::domain::EstadoTramite;
use crate::workflows::tramites::memory::{InMemoryCaseStore, InMemoryNotificationPublisher};
use crate::workflows::tramites::router::tramite_router;

fn build_router() -> (
    axum::Router,
    Arc<MemoryService>,
    Arc<InMemoryCaseStore>,
    Arc<InMemoryNotificationPublisher>,
) {
    let (service, store, notifier) = build_service();
    let service = Arc::new(service);
    (tramite_router(service.clone()), service, store, notifier)
}

async fn read_json(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

fn post_json(uri: String, payload: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("request")
}

fn get(uri: String) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

#[tokio::test]
async fn create_tramite_returns_created_view() {
    let (router, _, store, _) = build_router();
    let beca = seed_beca(&store, 1);
    // Seed only the postulación; the endpoint opens the case file.
    let postulacion = {
        use crate::workflows::tramites::domain::*;
        use crate::workflows::tramites::repository::CaseStore;
        let postulacion = Postulacion {
            id: PostulacionId(700_001),
            id_estudiante: EstudianteId(70),
            id_beca: beca.id,
            id_convocatoria: beca.id_convocatoria,
            id_formulario: FormularioId(9070),
            fecha_postulacion: chrono::Utc::now(),
            estado_postulado: EstadoPostulacion::Pendiente,
            puntaje_final: None,
            posicion_ranking: None,
            motivo_rechazo: None,
        };
        store.insert_postulacion(postulacion.clone()).expect("seed");
        postulacion
    };

    let response = router
        .clone()
        .oneshot(post_json(
            "/api/v1/tramites".to_string(),
            json!({ "id_postulacion": postulacion.id.0 }),
        ))
        .await
        .expect("router dispatch");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json(response).await;
    assert_eq!(payload["estado_actual"], json!("PENDIENTE"));
    assert!(payload["codigo"]
        .as_str()
        .unwrap_or_default()
        .starts_with("TRM-"));
}

#[tokio::test]
async fn show_tramite_round_trips() {
    let (router, service, store, _) = build_router();
    let beca = seed_beca(&store, 1);
    let (_, tramite) = seed_postulacion(&service, &beca, 71);

    let response = router
        .clone()
        .oneshot(get(format!("/api/v1/tramites/{}", tramite.id)))
        .await
        .expect("router dispatch");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    assert_eq!(payload["codigo"], json!(tramite.codigo));
    assert_eq!(payload["clasificado"], json!(false));

    let by_code = router
        .clone()
        .oneshot(get(format!("/api/v1/tramites/codigo/{}", tramite.codigo)))
        .await
        .expect("router dispatch");
    assert_eq!(by_code.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_tramite_maps_to_404() {
    let (router, _, _, _) = build_router();
    let response = router
        .clone()
        .oneshot(get("/api/v1/tramites/999999".to_string()))
        .await
        .expect("router dispatch");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = read_json(response).await;
    assert!(payload["error"].as_str().unwrap_or_default().contains("no encontrado"));
}

#[tokio::test]
async fn illegal_transition_maps_to_422() {
    let (router, service, store, _) = build_router();
    let beca = seed_beca(&store, 1);
    let (_, tramite) = seed_postulacion(&service, &beca, 72);

    let response = router
        .clone()
        .oneshot(post_json(
            format!("/api/v1/tramites/{}/transiciones", tramite.id),
            json!({ "estado": "APROBADO" }),
        ))
        .await
        .expect("router dispatch");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn incomplete_documents_report_the_missing_types() {
    let (router, service, store, _) = build_router();
    let beca = seed_beca(&store, 1);
    let (_, tramite) = seed_postulacion(&service, &beca, 73);
    service
        .transition(tramite.id, EstadoTramite::EnValidacion, Some(OPERADOR), None)
        .expect("inicia validación");
    service
        .transition(tramite.id, EstadoTramite::Validado, Some(OPERADOR), None)
        .expect("valida");
    upload(&service, &tramite, crate::workflows::tramites::domain::TipoDocumento::Ci);

    let response = router
        .clone()
        .oneshot(post_json(
            format!("/api/v1/tramites/{}/transiciones", tramite.id),
            json!({ "estado": "DIGITALIZADO", "revisado_por": 77 }),
        ))
        .await
        .expect("router dispatch");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json(response).await;
    assert_eq!(
        payload["faltantes"],
        json!(["KARDEX", "COMPROBANTE_DOMICILIO"])
    );
}

#[tokio::test]
async fn historial_lists_the_audit_trail() {
    let (router, service, store, _) = build_router();
    let beca = seed_beca(&store, 1);
    let (_, tramite) = seed_postulacion(&service, &beca, 74);
    service
        .transition(tramite.id, EstadoTramite::EnValidacion, Some(OPERADOR), None)
        .expect("inicia validación");

    let response = router
        .clone()
        .oneshot(get(format!("/api/v1/tramites/{}/historial", tramite.id)))
        .await
        .expect("router dispatch");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    let entries = payload.as_array().expect("array");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["estado_anterior"], Value::Null);
    assert_eq!(entries[1]["estado_nuevo"], json!("EN_VALIDACION"));
}

#[tokio::test]
async fn ranking_endpoint_settles_the_beca() {
    let (router, service, store, _) = build_router();
    let beca = seed_beca(&store, 1);
    for (estudiante, puntaje) in [(75u64, 92.0), (76, 81.0)] {
        let (postulacion, tramite) = seed_postulacion(&service, &beca, estudiante);
        service
            .asignar_puntaje(postulacion.id, puntaje)
            .expect("puntaje");
        digitalizar(&service, &tramite);
    }

    let clasificacion = router
        .clone()
        .oneshot(post_json(
            format!("/api/v1/becas/{}/clasificacion", beca.id),
            json!({ "revisado_por": 77 }),
        ))
        .await
        .expect("router dispatch");
    assert_eq!(clasificacion.status(), StatusCode::OK);

    let response = router
        .clone()
        .oneshot(post_json(
            format!("/api/v1/becas/{}/ranking", beca.id),
            json!({}),
        ))
        .await
        .expect("router dispatch");
    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json(response).await;
    let assignments = payload["assignments"].as_array().expect("assignments");
    assert_eq!(assignments.len(), 2);
    assert_eq!(assignments[0]["resultado"], json!("APROBADO"));
    assert_eq!(assignments[1]["resultado"], json!("DENEGADO"));

    let export = router
        .clone()
        .oneshot(get(format!("/api/v1/becas/{}/ranking/export", beca.id)))
        .await
        .expect("router dispatch");
    assert_eq!(export.status(), StatusCode::OK);
    let content_type = export
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/csv"));
    let body = to_bytes(export.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    let csv = String::from_utf8(body.to_vec()).expect("utf-8 csv");
    assert!(csv.starts_with("posicion,"));
    assert!(csv.contains("APROBADO"));

    let resumen = router
        .clone()
        .oneshot(get(format!("/api/v1/becas/{}/resumen", beca.id)))
        .await
        .expect("router dispatch");
    assert_eq!(resumen.status(), StatusCode::OK);
    let payload = read_json(resumen).await;
    assert_eq!(payload["aprobadas"], json!(1));
    assert_eq!(payload["cupos_restantes"], json!(0));
}

#[tokio::test]
async fn register_documento_endpoint_supersedes() {
    let (router, service, store, _) = build_router();
    let beca = seed_beca(&store, 1);
    let (_, tramite) = seed_postulacion(&service, &beca, 78);
    service
        .transition(tramite.id, EstadoTramite::EnValidacion, Some(OPERADOR), None)
        .expect("inicia validación");
    service
        .transition(tramite.id, EstadoTramite::Validado, Some(OPERADOR), None)
        .expect("valida");

    let payload = json!({
        "tipo": "CI",
        "nombre_archivo": "ci.pdf",
        "artifact_ref": "s3://dubss/docs/ci.pdf",
        "tamanho_bytes": 1024,
        "subido_por": 77
    });
    let response = router
        .clone()
        .oneshot(post_json(
            format!("/api/v1/tramites/{}/documentos", tramite.id),
            payload.clone(),
        ))
        .await
        .expect("router dispatch");
    assert_eq!(response.status(), StatusCode::CREATED);

    // Same tipo again: still one active CI documento.
    let again = router
        .clone()
        .oneshot(post_json(
            format!("/api/v1/tramites/{}/documentos", tramite.id),
            payload,
        ))
        .await
        .expect("router dispatch");
    assert_eq!(again.status(), StatusCode::CREATED);

    let listado = router
        .clone()
        .oneshot(get(format!("/api/v1/tramites/{}/documentos", tramite.id)))
        .await
        .expect("router dispatch");
    let documentos = read_json(listado).await;
    let ci_rows = documentos
        .as_array()
        .expect("array")
        .iter()
        .filter(|doc| doc["tipo"] == json!("CI"))
        .count();
    assert_eq!(ci_rows, 1);

    // The registration drove VALIDADO -> EN_DIGITALIZACION.
    let tramite = service.tramite(tramite.id).expect("trámite");
    assert_eq!(tramite.estado_actual, EstadoTramite::EnDigitalizacion);
}
