use chrono::{DateTime, Utc};

use super::domain::{
    ArtifactRef, Beca, BecaId, Documento, EstadoTramite, HistorialEntry, Notificacion,
    Postulacion, PostulacionId, Tramite, TramiteId,
};
use super::ranking::RankingAssignment;

/// Persistent record of trámites, historial, documentos, postulaciones, and
/// becas. The single source of truth: the service re-reads through this trait
/// before validating anything, and the mutating calls are each one atomic
/// unit of work.
pub trait CaseStore: Send + Sync {
    /// Persist a new trámite together with its creation historial entry.
    /// Fails with `Conflict` if the id, codigo, or owning postulación already
    /// has a trámite.
    fn insert_tramite(
        &self,
        tramite: Tramite,
        entry: HistorialEntry,
    ) -> Result<Tramite, CaseStoreError>;

    fn fetch_tramite(&self, id: TramiteId) -> Result<Option<Tramite>, CaseStoreError>;

    fn fetch_tramite_by_codigo(&self, codigo: &str) -> Result<Option<Tramite>, CaseStoreError>;

    fn fetch_tramite_by_postulacion(
        &self,
        id: PostulacionId,
    ) -> Result<Option<Tramite>, CaseStoreError>;

    /// Trámites currently in any of the given states, oldest first.
    fn tramites_by_estado(
        &self,
        estados: &[EstadoTramite],
    ) -> Result<Vec<Tramite>, CaseStoreError>;

    /// Atomically move a trámite from `expected` to `entry.estado_nuevo`,
    /// appending `entry` to its historial in the same unit of work. Fails
    /// with `StaleState` when the stored state no longer equals `expected`
    /// (a concurrent writer won the race).
    fn apply_transition(
        &self,
        id: TramiteId,
        expected: EstadoTramite,
        entry: HistorialEntry,
    ) -> Result<Tramite, CaseStoreError>;

    /// Flag the trámite as classified once ranking covered its beca.
    fn set_clasificado(
        &self,
        id: TramiteId,
        fecha: DateTime<Utc>,
    ) -> Result<Tramite, CaseStoreError>;

    /// Full historial for a trámite, strictly in append order.
    fn historial(&self, id: TramiteId) -> Result<Vec<HistorialEntry>, CaseStoreError>;

    /// Create or supersede the validated documento for (trámite, tipo).
    fn upsert_documento(&self, documento: Documento) -> Result<Documento, CaseStoreError>;

    /// Mark every documento presented for the trámite as validated; returns
    /// the updated set. Part of the EN_VALIDACION approval.
    fn validar_documentos(&self, id: TramiteId) -> Result<Vec<Documento>, CaseStoreError>;

    fn documentos(&self, id: TramiteId) -> Result<Vec<Documento>, CaseStoreError>;

    /// Fails with `Conflict` when the (estudiante, beca) pair already has a
    /// postulación.
    fn insert_postulacion(&self, postulacion: Postulacion)
        -> Result<Postulacion, CaseStoreError>;

    fn fetch_postulacion(&self, id: PostulacionId)
        -> Result<Option<Postulacion>, CaseStoreError>;

    fn update_postulacion(&self, postulacion: Postulacion) -> Result<(), CaseStoreError>;

    fn postulaciones_by_beca(&self, id: BecaId) -> Result<Vec<Postulacion>, CaseStoreError>;

    fn insert_beca(&self, beca: Beca) -> Result<Beca, CaseStoreError>;

    fn fetch_beca(&self, id: BecaId) -> Result<Option<Beca>, CaseStoreError>;

    /// Atomically replace the ranking outcome for a beca: every eligible
    /// postulación gets its new posicion/estado, and positions from a prior
    /// run that no longer appear in `assignments` are cleared. All-or-nothing
    /// as observed by concurrent readers.
    fn apply_ranking(
        &self,
        id_beca: BecaId,
        assignments: &[RankingAssignment],
    ) -> Result<(), CaseStoreError>;
}

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum CaseStoreError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("stale state: expected {expected}, found {actual}")]
    StaleState {
        expected: EstadoTramite,
        actual: EstadoTramite,
    },
    #[error("case store unavailable: {0}")]
    Unavailable(String),
}

/// Outbound notification hook. Delivery is best-effort: the service logs and
/// swallows failures so a committed transition is never reported as failed.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notificacion: Notificacion) -> Result<(), NotificationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// External blob storage for digitized artifacts.
pub trait DocumentStorage: Send + Sync {
    fn store(&self, bytes: &[u8], nombre_archivo: &str) -> Result<ArtifactRef, StorageError>;
    fn retrieve(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, StorageError>;
    fn delete(&self, artifact: &ArtifactRef) -> Result<(), StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("artifact not found: {0}")]
    NotFound(ArtifactRef),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Hook fired when a trámite reaches DIGITALIZADO, so an external job runner
/// can queue the classification batch. Best-effort, like notifications.
pub trait ClassificationTrigger: Send + Sync {
    fn tramite_digitalizado(&self, id_tramite: TramiteId, id_beca: BecaId);
}
