//! Integration specifications for the trámite lifecycle workflow.
//!
//! Scenarios run end-to-end through the public service facade and the HTTP
//! router, without reaching into private modules: a case file is opened,
//! validated, digitized, classified, and settled by the ranking engine.

mod common {
    use std::sync::Arc;

    use dubss::workflows::tramites::{
        Beca, BecaId, ConvocatoriaId, EstadoTramite, EstudianteId, FormularioId,
        InMemoryCaseStore, InMemoryDocumentStorage, InMemoryNotificationPublisher,
        NuevaPostulacion, Postulacion, TipoDocumento, Tramite, TramiteWorkflowService, UserId,
    };

    pub(super) type Service = TramiteWorkflowService<
        InMemoryCaseStore,
        InMemoryNotificationPublisher,
        InMemoryDocumentStorage,
    >;

    pub(super) const OPERADOR: UserId = UserId(42);

    static BECA_IDS: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(9_000);

    pub(super) fn build_service() -> (
        Arc<Service>,
        Arc<InMemoryCaseStore>,
        Arc<InMemoryNotificationPublisher>,
    ) {
        let store = Arc::new(InMemoryCaseStore::default());
        let notifier = Arc::new(InMemoryNotificationPublisher::default());
        let storage = Arc::new(InMemoryDocumentStorage::default());
        let service = Arc::new(TramiteWorkflowService::new(
            store.clone(),
            notifier.clone(),
            storage,
        ));
        (service, store, notifier)
    }

    pub(super) fn seed_beca(store: &InMemoryCaseStore, cupos: u32) -> Beca {
        use dubss::workflows::tramites::CaseStore;
        let id = BECA_IDS.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let beca = Beca {
            id: BecaId(id),
            id_convocatoria: ConvocatoriaId(7),
            codigo: format!("BECA-{id}"),
            nombre: "Beca Vivienda".to_string(),
            monto: 600.0,
            cupos_disponibles: cupos,
        };
        store.insert_beca(beca.clone()).expect("beca seeds");
        beca
    }

    pub(super) fn postular(
        service: &Service,
        beca: &Beca,
        estudiante: u64,
    ) -> (Postulacion, Tramite) {
        service
            .create_postulacion(NuevaPostulacion {
                id_estudiante: EstudianteId(estudiante),
                id_beca: beca.id,
                id_formulario: FormularioId(estudiante + 3_000),
                creado_por: None,
            })
            .expect("postulación creada")
    }

    pub(super) fn digitalizar(service: &Service, tramite: &Tramite) {
        service
            .transition(tramite.id, EstadoTramite::EnValidacion, Some(OPERADOR), None)
            .expect("inicia validación");
        service
            .transition(tramite.id, EstadoTramite::Validado, Some(OPERADOR), None)
            .expect("valida documentación");
        for tipo in [
            TipoDocumento::Ci,
            TipoDocumento::Kardex,
            TipoDocumento::ComprobanteDomicilio,
        ] {
            service
                .upload_documento(tramite.id, tipo, b"escaneo", "escaneo.pdf", Some(OPERADOR))
                .expect("documento digitalizado");
        }
        service
            .transition(tramite.id, EstadoTramite::Digitalizado, Some(OPERADOR), None)
            .expect("digitalización completa");
    }
}

mod lifecycle {
    use super::common::*;
    use dubss::workflows::tramites::{
        EstadoPostulacion, EstadoTramite, GuardViolation, TipoDocumento, TipoNotificacion,
        WorkflowError,
    };

    #[test]
    fn happy_path_reaches_aprobado_with_full_audit_trail() {
        let (service, store, notifier) = build_service();
        let beca = seed_beca(&store, 1);
        let (postulacion, tramite) = postular(&service, &beca, 1);
        service
            .asignar_puntaje(postulacion.id, 87.5)
            .expect("puntaje externo");

        digitalizar(&service, &tramite);
        service
            .start_clasificacion(beca.id, Some(OPERADOR))
            .expect("batch de clasificación");
        let ranking = service.rank(beca.id, Some(OPERADOR)).expect("ranking");
        assert_eq!(ranking.assignments.len(), 1);

        let tramite = service.tramite(tramite.id).expect("trámite");
        assert_eq!(tramite.estado_actual, EstadoTramite::Aprobado);
        assert!(tramite.clasificado);

        let historial = service.historial(tramite.id).expect("historial");
        let estados: Vec<&str> = historial
            .iter()
            .map(|entry| entry.estado_nuevo.label())
            .collect();
        assert_eq!(
            estados,
            vec![
                "PENDIENTE",
                "EN_VALIDACION",
                "VALIDADO",
                "EN_DIGITALIZACION",
                "DIGITALIZADO",
                "EN_CLASIFICACION",
                "CLASIFICADO",
                "APROBADO",
            ]
        );
        assert_eq!(historial.last().expect("entry").estado_nuevo, tramite.estado_actual);

        let postulacion = service.postulacion(postulacion.id).expect("postulación");
        assert_eq!(postulacion.estado_postulado, EstadoPostulacion::Aprobado);
        assert_eq!(postulacion.posicion_ranking, Some(1));

        assert!(notifier
            .events()
            .iter()
            .any(|evento| evento.tipo == TipoNotificacion::Resultado
                && evento.mensaje.contains("APROBADA")));
    }

    #[test]
    fn digitization_is_gated_on_the_mandatory_set() {
        let (service, store, _) = build_service();
        let beca = seed_beca(&store, 1);
        let (_, tramite) = postular(&service, &beca, 2);

        service
            .transition(tramite.id, EstadoTramite::EnValidacion, Some(OPERADOR), None)
            .expect("inicia validación");
        service
            .transition(tramite.id, EstadoTramite::Validado, Some(OPERADOR), None)
            .expect("valida");

        // Nothing uploaded yet: the digitization edge refuses to open.
        match service.transition(
            tramite.id,
            EstadoTramite::EnDigitalizacion,
            Some(OPERADOR),
            None,
        ) {
            Err(WorkflowError::Guard(GuardViolation::SinDocumentos)) => {}
            other => panic!("expected sin documentos, got {other:?}"),
        }

        for tipo in [TipoDocumento::Ci, TipoDocumento::Kardex] {
            service
                .upload_documento(tramite.id, tipo, b"escaneo", "escaneo.pdf", Some(OPERADOR))
                .expect("documento digitalizado");
        }

        match service.transition(tramite.id, EstadoTramite::Digitalizado, Some(OPERADOR), None) {
            Err(WorkflowError::Guard(GuardViolation::IncompleteDocuments { missing })) => {
                assert_eq!(missing, vec![TipoDocumento::ComprobanteDomicilio]);
            }
            other => panic!("expected incomplete documents, got {other:?}"),
        }
    }

    #[test]
    fn cupos_cap_the_aprobados_deterministically() {
        let (service, store, _) = build_service();
        let beca = seed_beca(&store, 2);

        // Three scored applicants, two seats; the 90-point tie resolves by
        // application order.
        let pool = [(10u64, 90.0), (11, 90.0), (12, 85.0)];
        let mut postulaciones = Vec::new();
        for (estudiante, puntaje) in pool {
            let (postulacion, tramite) = postular(&service, &beca, estudiante);
            service
                .asignar_puntaje(postulacion.id, puntaje)
                .expect("puntaje");
            digitalizar(&service, &tramite);
            postulaciones.push(postulacion);
        }
        service
            .start_clasificacion(beca.id, Some(OPERADOR))
            .expect("clasificación");

        let primera = service.rank(beca.id, Some(OPERADOR)).expect("ranking");
        let resultados: Vec<(u64, EstadoPostulacion)> = primera
            .assignments
            .iter()
            .map(|entry| (entry.id_postulacion.0, entry.resultado))
            .collect();
        assert_eq!(
            resultados,
            vec![
                (postulaciones[0].id.0, EstadoPostulacion::Aprobado),
                (postulaciones[1].id.0, EstadoPostulacion::Aprobado),
                (postulaciones[2].id.0, EstadoPostulacion::Denegado),
            ]
        );
        assert!(primera.aprobados().count() <= beca.cupos_disponibles as usize);

        // Determinism: reading the persisted ranking reproduces the run.
        let releida = service.ranking_actual(beca.id).expect("ranking persistido");
        assert_eq!(releida.assignments, primera.assignments);
    }

    #[test]
    fn rejected_tramites_never_reach_classification() {
        let (service, store, notifier) = build_service();
        let beca = seed_beca(&store, 1);
        let (postulacion, tramite) = postular(&service, &beca, 20);
        service
            .asignar_puntaje(postulacion.id, 99.0)
            .expect("puntaje");

        service
            .transition(tramite.id, EstadoTramite::EnValidacion, Some(OPERADOR), None)
            .expect("inicia validación");
        service
            .transition(
                tramite.id,
                EstadoTramite::Rechazado,
                Some(OPERADOR),
                Some("Comprobante de domicilio vencido".to_string()),
            )
            .expect("rechazo");

        service
            .start_clasificacion(beca.id, Some(OPERADOR))
            .expect("clasificación");
        let ranking = service.rank(beca.id, Some(OPERADOR)).expect("ranking");

        // Score or not, a rejected postulación is out of the pool for good.
        assert!(ranking.assignments.is_empty());
        let tramite = service.tramite(tramite.id).expect("trámite");
        assert_eq!(tramite.estado_actual, EstadoTramite::Rechazado);
        assert!(notifier
            .events()
            .iter()
            .any(|evento| evento.mensaje.contains("vencido")));
    }
}

mod routing {
    use super::common::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use dubss::workflows::tramites::{tramite_router, EstadoTramite};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    #[tokio::test]
    async fn transition_endpoint_drives_the_machine() {
        let (service, store, _) = build_service();
        let beca = seed_beca(&store, 1);
        let (_, tramite) = postular(&service, &beca, 30);
        let router = tramite_router(service.clone());

        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/v1/tramites/{}/transiciones", tramite.id))
                    .header("content-type", "application/json")
                    .body(Body::from(
                        json!({ "estado": "EN_VALIDACION", "revisado_por": 42 }).to_string(),
                    ))
                    .expect("request"),
            )
            .await
            .expect("router dispatch");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("body");
        let payload: Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(payload["estado_actual"], json!("EN_VALIDACION"));

        let tramite = service.tramite(tramite.id).expect("trámite");
        assert_eq!(tramite.estado_actual, EstadoTramite::EnValidacion);
    }

    #[tokio::test]
    async fn conflicting_codigo_lookup_is_a_404() {
        let (service, _, _) = build_service();
        let router = tramite_router(service);

        let response = router
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/v1/tramites/codigo/TRM-NOEXISTE")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router dispatch");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
