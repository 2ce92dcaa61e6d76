use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::workflows::tramites::domain::{
    Beca, BecaId, ConvocatoriaId, EstadoPostulacion, EstadoTramite, EstudianteId, FormularioId,
    Postulacion, PostulacionId, TipoDocumento, Tramite, UserId,
};
use crate::workflows::tramites::memory::{
    InMemoryCaseStore, InMemoryDocumentStorage, InMemoryNotificationPublisher,
};
use crate::workflows::tramites::repository::{
    CaseStore, NotificationError, NotificationPublisher,
};
use crate::workflows::tramites::service::{NuevaPostulacion, TramiteWorkflowService};

pub(super) type MemoryService = TramiteWorkflowService<
    InMemoryCaseStore,
    InMemoryNotificationPublisher,
    InMemoryDocumentStorage,
>;

pub(super) const OPERADOR: UserId = UserId(77);

pub(super) fn build_service() -> (
    MemoryService,
    Arc<InMemoryCaseStore>,
    Arc<InMemoryNotificationPublisher>,
) {
    let store = Arc::new(InMemoryCaseStore::default());
    let notifier = Arc::new(InMemoryNotificationPublisher::default());
    let storage = Arc::new(InMemoryDocumentStorage::default());
    let service = TramiteWorkflowService::new(store.clone(), notifier.clone(), storage);
    (service, store, notifier)
}

static BECA_SEQUENCE: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

pub(super) fn seed_beca(store: &InMemoryCaseStore, cupos: u32) -> Beca {
    let id = BECA_SEQUENCE.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    let beca = Beca {
        id: BecaId(id),
        id_convocatoria: ConvocatoriaId(1),
        codigo: format!("BECA-{id:03}"),
        nombre: "Beca Alimentación".to_string(),
        monto: 400.0,
        cupos_disponibles: cupos,
    };
    store.insert_beca(beca.clone()).expect("beca seeds");
    beca
}

pub(super) fn seed_postulacion(
    service: &MemoryService,
    beca: &Beca,
    estudiante: u64,
) -> (Postulacion, Tramite) {
    service
        .create_postulacion(NuevaPostulacion {
            id_estudiante: EstudianteId(estudiante),
            id_beca: beca.id,
            id_formulario: FormularioId(estudiante + 9000),
            creado_por: Some(OPERADOR),
        })
        .expect("postulación seeds")
}

/// Walk a freshly created trámite up to EN_DIGITALIZACION with the mandatory
/// documentos registered, leaving the DIGITALIZADO transition to the caller.
pub(super) fn register_obligatorios(service: &MemoryService, tramite: &Tramite) {
    service
        .transition(
            tramite.id,
            EstadoTramite::EnValidacion,
            Some(OPERADOR),
            None,
        )
        .expect("inicia validación");
    service
        .transition(tramite.id, EstadoTramite::Validado, Some(OPERADOR), None)
        .expect("valida documentación");

    for tipo in [
        TipoDocumento::Ci,
        TipoDocumento::Kardex,
        TipoDocumento::ComprobanteDomicilio,
    ] {
        upload(service, tramite, tipo);
    }
}

pub(super) fn upload(service: &MemoryService, tramite: &Tramite, tipo: TipoDocumento) {
    service
        .upload_documento(
            tramite.id,
            tipo,
            b"contenido-escaneado",
            "escaneo.pdf",
            Some(OPERADOR),
        )
        .expect("documento registrado");
}

/// All the way to DIGITALIZADO.
pub(super) fn digitalizar(service: &MemoryService, tramite: &Tramite) {
    register_obligatorios(service, tramite);
    service
        .transition(tramite.id, EstadoTramite::Digitalizado, Some(OPERADOR), None)
        .expect("completa digitalización");
}

/// Postulación literal for pure ranking tests, with controllable tie-break
/// inputs.
pub(super) fn postulacion_puntuada(
    id: u64,
    puntaje: Option<f64>,
    fecha: DateTime<Utc>,
) -> Postulacion {
    Postulacion {
        id: PostulacionId(id),
        id_estudiante: EstudianteId(id + 100),
        id_beca: BecaId(999),
        id_convocatoria: ConvocatoriaId(1),
        id_formulario: FormularioId(id + 500),
        fecha_postulacion: fecha,
        estado_postulado: EstadoPostulacion::Pendiente,
        puntaje_final: puntaje,
        posicion_ranking: None,
        motivo_rechazo: None,
    }
}

pub(super) fn fecha(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, day, hour, 0, 0).single().expect("valid date")
}

/// Publisher whose transport always fails, for the swallow-on-error policy.
#[derive(Default, Clone)]
pub(super) struct FailingNotifier;

impl NotificationPublisher for FailingNotifier {
    fn publish(
        &self,
        _notificacion: crate::workflows::tramites::domain::Notificacion,
    ) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp caído".to_string()))
    }
}
