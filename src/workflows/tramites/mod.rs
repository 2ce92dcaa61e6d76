//! Trámite lifecycle workflow: case record keeping, the document gate, the
//! state machine, and the ranking engine that settles each beca's seats.

pub mod documents;
pub mod domain;
pub mod export;
pub mod machine;
pub mod memory;
pub mod ranking;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    ArtifactRef, Beca, BecaId, ConvocatoriaId, Documento, DocumentoId, EstadoPostulacion,
    EstadoTramite, EstudianteId, FormularioId, HistorialEntry, Notificacion, Postulacion,
    PostulacionId, TipoDocumento, TipoNotificacion, Tramite, TramiteId, UserId,
};
pub use export::ExportError;
pub use machine::GuardViolation;
pub use memory::{
    InMemoryCaseStore, InMemoryDocumentStorage, InMemoryNotificationPublisher,
    RecordingClassificationTrigger,
};
pub use ranking::{compute_ranking, RankingAssignment, RankingResult};
pub use repository::{
    CaseStore, CaseStoreError, ClassificationTrigger, DocumentStorage, NotificationError,
    NotificationPublisher, StorageError,
};
pub use router::{tramite_router, DocumentoView, HistorialView, TramiteView};
pub use service::{NuevaPostulacion, ResumenBeca, TramiteWorkflowService, WorkflowError};
