use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::documents;
use super::domain::{
    ArtifactRef, Beca, BecaId, Documento, DocumentoId, EstadoPostulacion, EstadoTramite,
    EstudianteId, FormularioId, HistorialEntry, Notificacion, Postulacion, PostulacionId,
    TipoDocumento, TipoNotificacion, Tramite, TramiteId, UserId,
};
use super::machine::{self, EdgeGuard, GuardViolation};
use super::ranking::{compute_ranking, RankingAssignment, RankingResult};
use super::repository::{
    CaseStore, CaseStoreError, ClassificationTrigger, DocumentStorage, NotificationPublisher,
    StorageError,
};

/// Error raised by the workflow service.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("trámite {0} no encontrado")]
    TramiteNotFound(TramiteId),
    #[error("trámite con código {0} no encontrado")]
    CodigoNotFound(String),
    #[error("postulación {0} no encontrada")]
    PostulacionNotFound(PostulacionId),
    #[error("beca {0} no encontrada")]
    BecaNotFound(BecaId),
    #[error("transición no permitida: {from} -> {to}")]
    InvalidTransition {
        from: EstadoTramite,
        to: EstadoTramite,
    },
    #[error(transparent)]
    Guard(#[from] GuardViolation),
    #[error("conflicto de escritura concurrente, vuelva a intentar la operación")]
    Conflict,
    #[error("ya existe una postulación del estudiante a esta beca")]
    PostulacionDuplicada,
    #[error("la beca ya no tiene cupos disponibles")]
    SinCupos,
    #[error("puntaje inválido: {0}")]
    PuntajeInvalido(f64),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Store(CaseStoreError),
}

impl From<CaseStoreError> for WorkflowError {
    fn from(value: CaseStoreError) -> Self {
        match value {
            // A stale CAS or a record that vanished mid-operation both mean a
            // concurrent writer got there first: retry from a fresh read.
            CaseStoreError::Conflict
            | CaseStoreError::StaleState { .. }
            | CaseStoreError::NotFound => WorkflowError::Conflict,
            other => WorkflowError::Store(other),
        }
    }
}

/// Input for registering a new postulación along with its trámite.
#[derive(Debug, Clone)]
pub struct NuevaPostulacion {
    pub id_estudiante: EstudianteId,
    pub id_beca: BecaId,
    pub id_formulario: FormularioId,
    pub creado_por: Option<UserId>,
}

/// Per-beca occupancy snapshot, derived entirely from persisted ranking
/// output — cupos restantes is never a stored counter.
#[derive(Debug, Clone, Serialize)]
pub struct ResumenBeca {
    pub id_beca: BecaId,
    pub nombre: String,
    pub cupos_disponibles: u32,
    pub postulaciones: usize,
    pub aprobadas: usize,
    pub denegadas: usize,
    pub pendientes: usize,
    pub cupos_restantes: u32,
    pub tasa_ocupacion: f64,
    pub promedio_puntaje: Option<f64>,
}

static TRAMITE_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static POSTULACION_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static DOCUMENTO_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_tramite() -> (TramiteId, String) {
    let id = TRAMITE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    (TramiteId(id), format!("TRM-{id:06}"))
}

/// Service composing the case store, document gate, state machine, and
/// ranking engine. The only writer of trámite state: every mutation re-reads
/// current state through the store before validating.
pub struct TramiteWorkflowService<S, N, F> {
    store: Arc<S>,
    notifier: Arc<N>,
    storage: Arc<F>,
    classification: Option<Arc<dyn ClassificationTrigger>>,
}

impl<S, N, F> TramiteWorkflowService<S, N, F>
where
    S: CaseStore + 'static,
    N: NotificationPublisher + 'static,
    F: DocumentStorage + 'static,
{
    pub fn new(store: Arc<S>, notifier: Arc<N>, storage: Arc<F>) -> Self {
        Self {
            store,
            notifier,
            storage,
            classification: None,
        }
    }

    pub fn with_classification_trigger(mut self, trigger: Arc<dyn ClassificationTrigger>) -> Self {
        self.classification = Some(trigger);
        self
    }

    /// Register a postulación and its trámite (in PENDIENTE, with a creation
    /// historial entry). One postulación per (estudiante, beca); rejected
    /// outright when the beca has no seats left.
    pub fn create_postulacion(
        &self,
        nueva: NuevaPostulacion,
    ) -> Result<(Postulacion, Tramite), WorkflowError> {
        let beca = self
            .store
            .fetch_beca(nueva.id_beca)?
            .ok_or(WorkflowError::BecaNotFound(nueva.id_beca))?;

        if self.cupos_restantes(beca.id)? == 0 {
            return Err(WorkflowError::SinCupos);
        }

        let postulacion = Postulacion {
            id: PostulacionId(POSTULACION_SEQUENCE.fetch_add(1, Ordering::Relaxed)),
            id_estudiante: nueva.id_estudiante,
            id_beca: beca.id,
            id_convocatoria: beca.id_convocatoria,
            id_formulario: nueva.id_formulario,
            fecha_postulacion: Utc::now(),
            estado_postulado: EstadoPostulacion::Pendiente,
            puntaje_final: None,
            posicion_ranking: None,
            motivo_rechazo: None,
        };
        let postulacion = self
            .store
            .insert_postulacion(postulacion)
            .map_err(|err| match err {
                CaseStoreError::Conflict => WorkflowError::PostulacionDuplicada,
                other => other.into(),
            })?;

        let tramite = self.create_tramite(postulacion.id, nueva.creado_por)?;
        Ok((postulacion, tramite))
    }

    /// Open the case file for an existing postulación. Called once per
    /// postulación; a second call surfaces as a conflict.
    pub fn create_tramite(
        &self,
        id_postulacion: PostulacionId,
        creado_por: Option<UserId>,
    ) -> Result<Tramite, WorkflowError> {
        self.store
            .fetch_postulacion(id_postulacion)?
            .ok_or(WorkflowError::PostulacionNotFound(id_postulacion))?;

        let now = Utc::now();
        let (id, codigo) = next_tramite();
        let tramite = Tramite {
            id,
            id_postulacion,
            codigo,
            estado_actual: EstadoTramite::INICIAL,
            clasificado: false,
            fecha_creacion: now,
            fecha_clasificacion: None,
        };
        let entry = HistorialEntry {
            estado_anterior: None,
            estado_nuevo: EstadoTramite::INICIAL,
            observaciones: Some("Trámite creado automáticamente".to_string()),
            revisado_por: creado_por,
            fecha: now,
        };

        let tramite = self.store.insert_tramite(tramite, entry)?;
        info!(tramite = %tramite.codigo, "trámite creado");
        Ok(tramite)
    }

    /// Move a trámite along one legal edge of the lifecycle graph. Validates
    /// the edge and its guard against fresh store data, then applies the
    /// state change and the historial append atomically.
    pub fn transition(
        &self,
        id: TramiteId,
        to: EstadoTramite,
        revisado_por: Option<UserId>,
        observaciones: Option<String>,
    ) -> Result<Tramite, WorkflowError> {
        let tramite = self.tramite(id)?;
        let from = tramite.estado_actual;

        if !machine::allowed(from, to) {
            return Err(WorkflowError::InvalidTransition { from, to });
        }
        self.check_guard(&tramite, from, to, observaciones.as_deref())?;

        let observaciones = observaciones
            .filter(|texto| !texto.trim().is_empty())
            .or_else(|| default_observacion(to).map(str::to_string));

        let entry = HistorialEntry {
            estado_anterior: Some(from),
            estado_nuevo: to,
            observaciones: observaciones.clone(),
            revisado_por,
            fecha: Utc::now(),
        };
        let updated = self.store.apply_transition(id, from, entry)?;
        info!(tramite = %updated.codigo, %from, %to, "transición aplicada");

        self.after_transition(&updated, observaciones.as_deref())?;
        Ok(updated)
    }

    fn check_guard(
        &self,
        tramite: &Tramite,
        from: EstadoTramite,
        to: EstadoTramite,
        observaciones: Option<&str>,
    ) -> Result<(), WorkflowError> {
        let Some(guard) = machine::guard_for(from, to) else {
            return Ok(());
        };

        match guard {
            EdgeGuard::ObservacionRequerida => {
                if observaciones.map_or(true, |texto| texto.trim().is_empty()) {
                    return Err(GuardViolation::MissingObservacion.into());
                }
            }
            EdgeGuard::AlgunDocumento => {
                let documentos = self.documentos(tramite.id)?;
                if !documents::has_artifact(&documentos) {
                    return Err(GuardViolation::SinDocumentos.into());
                }
            }
            EdgeGuard::DocumentosObligatorios => {
                let documentos = self.documentos(tramite.id)?;
                let missing = documents::missing_obligatorios(&documentos);
                if !missing.is_empty() {
                    return Err(GuardViolation::IncompleteDocuments { missing }.into());
                }
            }
            EdgeGuard::RankingComputado => {
                let postulacion = self.postulacion(tramite.id_postulacion)?;
                if postulacion.posicion_ranking.is_none() {
                    return Err(GuardViolation::RankingPendiente.into());
                }
            }
            EdgeGuard::ResultadoSegunRanking => {
                let postulacion = self.postulacion(tramite.id_postulacion)?;
                let beca = self
                    .store
                    .fetch_beca(postulacion.id_beca)?
                    .ok_or(WorkflowError::BecaNotFound(postulacion.id_beca))?;
                let Some(posicion) = postulacion.posicion_ranking else {
                    return Err(GuardViolation::RankingPendiente.into());
                };
                let esperado = if posicion <= beca.cupos_disponibles {
                    EstadoTramite::Aprobado
                } else {
                    EstadoTramite::Denegado
                };
                if to != esperado {
                    return Err(GuardViolation::ResultadoInconsistente {
                        posicion,
                        cupos: beca.cupos_disponibles,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    /// Side effects of a committed transition. Store writes propagate errors;
    /// notification and trigger failures are logged and swallowed.
    fn after_transition(
        &self,
        tramite: &Tramite,
        observaciones: Option<&str>,
    ) -> Result<(), WorkflowError> {
        match tramite.estado_actual {
            EstadoTramite::Validado => {
                self.store.validar_documentos(tramite.id)?;
                let postulacion = self.postulacion(tramite.id_postulacion)?;
                self.notify(
                    &postulacion,
                    tramite,
                    TipoNotificacion::Alerta,
                    "Documentos validados",
                    "Tu documentación ha sido aprobada. El próximo paso es la digitalización."
                        .to_string(),
                );
            }
            EstadoTramite::Rechazado => {
                let motivo = observaciones.unwrap_or("Documentos rechazados");
                let mut postulacion = self.postulacion(tramite.id_postulacion)?;
                postulacion.estado_postulado = EstadoPostulacion::Rechazado;
                postulacion.motivo_rechazo = Some(motivo.to_string());
                self.store.update_postulacion(postulacion.clone())?;
                self.notify(
                    &postulacion,
                    tramite,
                    TipoNotificacion::Resultado,
                    "Documentos rechazados",
                    format!("Tu documentación fue rechazada. Motivo: {motivo}"),
                );
            }
            EstadoTramite::Digitalizado => {
                let postulacion = self.postulacion(tramite.id_postulacion)?;
                self.notify(
                    &postulacion,
                    tramite,
                    TipoNotificacion::Informacion,
                    "Digitalización completa",
                    "Tu expediente ha sido digitalizado. El próximo paso es la clasificación automática."
                        .to_string(),
                );
                if let Some(trigger) = &self.classification {
                    trigger.tramite_digitalizado(tramite.id, postulacion.id_beca);
                }
            }
            EstadoTramite::Aprobado | EstadoTramite::Denegado => {
                let postulacion = self.postulacion(tramite.id_postulacion)?;
                let posicion = postulacion
                    .posicion_ranking
                    .map(|valor| valor.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let mensaje = if tramite.estado_actual == EstadoTramite::Aprobado {
                    format!("Tu postulación fue APROBADA en la posición {posicion} del ranking.")
                } else {
                    format!("Tu postulación fue DENEGADA (posición {posicion} del ranking).")
                };
                self.notify(
                    &postulacion,
                    tramite,
                    TipoNotificacion::Resultado,
                    "Resultado de tu postulación",
                    mensaje,
                );
            }
            _ => {}
        }
        Ok(())
    }

    fn notify(
        &self,
        postulacion: &Postulacion,
        tramite: &Tramite,
        tipo: TipoNotificacion,
        titulo: &str,
        mensaje: String,
    ) {
        let notificacion = Notificacion {
            id_estudiante: postulacion.id_estudiante,
            id_tramite: Some(tramite.id),
            tipo,
            titulo: titulo.to_string(),
            mensaje,
            canal: "sistema".to_string(),
        };
        if let Err(err) = self.notifier.publish(notificacion) {
            warn!(tramite = %tramite.codigo, %err, "notificación descartada");
        }
    }

    /// Create or supersede the validated documento for (trámite, tipo). From
    /// VALIDADO, the first registration also drives the trámite into
    /// EN_DIGITALIZACION.
    pub fn register_documento(
        &self,
        id_tramite: TramiteId,
        tipo: TipoDocumento,
        artifact: ArtifactRef,
        nombre_archivo: String,
        tamanho_bytes: u64,
        subido_por: Option<UserId>,
    ) -> Result<Documento, WorkflowError> {
        let tramite = self.tramite(id_tramite)?;
        if !matches!(
            tramite.estado_actual,
            EstadoTramite::Validado | EstadoTramite::EnDigitalizacion
        ) {
            return Err(WorkflowError::InvalidTransition {
                from: tramite.estado_actual,
                to: EstadoTramite::EnDigitalizacion,
            });
        }

        let documento = Documento {
            id: DocumentoId(DOCUMENTO_SEQUENCE.fetch_add(1, Ordering::Relaxed)),
            id_tramite,
            tipo,
            nombre_archivo,
            artifact,
            tamanho_bytes,
            validado: true,
            fecha_subida: Utc::now(),
            subido_por,
        };
        let documento = self.store.upsert_documento(documento)?;

        if tramite.estado_actual == EstadoTramite::Validado {
            match self.transition(
                id_tramite,
                EstadoTramite::EnDigitalizacion,
                subido_por,
                None,
            ) {
                Ok(_) => {}
                // A concurrent upload already moved it; the documento stands.
                Err(WorkflowError::Conflict) | Err(WorkflowError::InvalidTransition { .. }) => {}
                Err(err) => return Err(err),
            }
        }

        Ok(documento)
    }

    /// Digitization upload path: persist the bytes through the storage
    /// collaborator, then register the resulting artifact.
    pub fn upload_documento(
        &self,
        id_tramite: TramiteId,
        tipo: TipoDocumento,
        bytes: &[u8],
        nombre_archivo: &str,
        subido_por: Option<UserId>,
    ) -> Result<Documento, WorkflowError> {
        let tramite = self.tramite(id_tramite)?;
        let almacenado = format!("{}_{}_{}", tipo.label(), tramite.codigo, nombre_archivo);
        let artifact = self.storage.store(bytes, &almacenado)?;
        self.register_documento(
            id_tramite,
            tipo,
            artifact,
            almacenado,
            bytes.len() as u64,
            subido_por,
        )
    }

    /// Move every DIGITALIZADO trámite of the beca into EN_CLASIFICACION.
    /// This is the operator-driven start of a classification batch.
    pub fn start_clasificacion(
        &self,
        id_beca: BecaId,
        revisado_por: Option<UserId>,
    ) -> Result<Vec<Tramite>, WorkflowError> {
        self.beca(id_beca)?;

        let mut movidos = Vec::new();
        for postulacion in self.store.postulaciones_by_beca(id_beca)? {
            let Some(tramite) = self.store.fetch_tramite_by_postulacion(postulacion.id)? else {
                continue;
            };
            if tramite.estado_actual != EstadoTramite::Digitalizado {
                continue;
            }
            match self.transition(
                tramite.id,
                EstadoTramite::EnClasificacion,
                revisado_por,
                None,
            ) {
                Ok(actualizado) => movidos.push(actualizado),
                // Another operator raced this batch; skip the loser.
                Err(WorkflowError::Conflict) | Err(WorkflowError::InvalidTransition { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        info!(beca = %id_beca, tramites = movidos.len(), "clasificación iniciada");
        Ok(movidos)
    }

    /// Record the externally computed puntaje for a postulación.
    pub fn asignar_puntaje(
        &self,
        id_postulacion: PostulacionId,
        puntaje: f64,
    ) -> Result<Postulacion, WorkflowError> {
        if !puntaje.is_finite() || puntaje < 0.0 {
            return Err(WorkflowError::PuntajeInvalido(puntaje));
        }
        let mut postulacion = self.postulacion(id_postulacion)?;
        postulacion.puntaje_final = Some(puntaje);
        self.store.update_postulacion(postulacion.clone())?;
        Ok(postulacion)
    }

    /// Rank the beca's scored pool and apply the outcome: positions and
    /// estados are persisted for every eligible postulación in one atomic
    /// write (a full recomputation, never an incremental patch), then each
    /// owning trámite in EN_CLASIFICACION is driven through CLASIFICADO to
    /// its APROBADO/DENEGADO outcome.
    pub fn rank(
        &self,
        id_beca: BecaId,
        revisado_por: Option<UserId>,
    ) -> Result<RankingResult, WorkflowError> {
        let beca = self.beca(id_beca)?;
        // Rechazadas left the flow during validation; a score on record must
        // not pull them back into the pool.
        let postulaciones: Vec<Postulacion> = self
            .store
            .postulaciones_by_beca(id_beca)?
            .into_iter()
            .filter(|postulacion| postulacion.estado_postulado != EstadoPostulacion::Rechazado)
            .collect();
        let result = compute_ranking(&beca, postulaciones)?;

        self.store.apply_ranking(id_beca, &result.assignments)?;

        for entry in &result.assignments {
            let Some(tramite) = self
                .store
                .fetch_tramite_by_postulacion(entry.id_postulacion)?
            else {
                continue;
            };
            if tramite.estado_actual != EstadoTramite::EnClasificacion {
                continue;
            }

            self.transition(tramite.id, EstadoTramite::Clasificado, revisado_por, None)?;
            self.store.set_clasificado(tramite.id, Utc::now())?;

            let destino = match entry.resultado {
                EstadoPostulacion::Aprobado => EstadoTramite::Aprobado,
                _ => EstadoTramite::Denegado,
            };
            let observacion = format!(
                "Posición {} de {} cupos, puntaje {:.2}",
                entry.posicion, beca.cupos_disponibles, entry.puntaje
            );
            self.transition(tramite.id, destino, revisado_por, Some(observacion))?;
        }

        info!(
            beca = %beca.codigo,
            elegibles = result.assignments.len(),
            aprobados = result.aprobados().count(),
            "ranking aplicado"
        );
        Ok(result)
    }

    /// Reconstruct the latest persisted ranking of a beca without
    /// recomputing it. Positions come straight from the stored postulaciones.
    pub fn ranking_actual(&self, id_beca: BecaId) -> Result<RankingResult, WorkflowError> {
        let beca = self.beca(id_beca)?;
        let mut assignments: Vec<RankingAssignment> = self
            .store
            .postulaciones_by_beca(id_beca)?
            .into_iter()
            .filter_map(|postulacion| {
                Some(RankingAssignment {
                    posicion: postulacion.posicion_ranking?,
                    puntaje: postulacion.puntaje_final?,
                    id_postulacion: postulacion.id,
                    id_estudiante: postulacion.id_estudiante,
                    resultado: postulacion.estado_postulado,
                })
            })
            .collect();
        assignments.sort_by_key(|entry| entry.posicion);
        Ok(RankingResult {
            id_beca: beca.id,
            cupos_disponibles: beca.cupos_disponibles,
            assignments,
        })
    }

    pub fn tramite(&self, id: TramiteId) -> Result<Tramite, WorkflowError> {
        self.store
            .fetch_tramite(id)?
            .ok_or(WorkflowError::TramiteNotFound(id))
    }

    pub fn tramite_por_codigo(&self, codigo: &str) -> Result<Tramite, WorkflowError> {
        self.store
            .fetch_tramite_by_codigo(codigo)?
            .ok_or_else(|| WorkflowError::CodigoNotFound(codigo.to_string()))
    }

    pub fn postulacion(&self, id: PostulacionId) -> Result<Postulacion, WorkflowError> {
        self.store
            .fetch_postulacion(id)?
            .ok_or(WorkflowError::PostulacionNotFound(id))
    }

    pub fn beca(&self, id: BecaId) -> Result<Beca, WorkflowError> {
        self.store
            .fetch_beca(id)?
            .ok_or(WorkflowError::BecaNotFound(id))
    }

    /// Ordered audit trail for a trámite.
    pub fn historial(&self, id: TramiteId) -> Result<Vec<HistorialEntry>, WorkflowError> {
        self.store.historial(id).map_err(|err| match err {
            CaseStoreError::NotFound => WorkflowError::TramiteNotFound(id),
            other => other.into(),
        })
    }

    pub fn documentos(&self, id: TramiteId) -> Result<Vec<Documento>, WorkflowError> {
        self.store.documentos(id).map_err(|err| match err {
            CaseStoreError::NotFound => WorkflowError::TramiteNotFound(id),
            other => other.into(),
        })
    }

    /// Trámites awaiting operator validation, oldest first.
    pub fn pendientes_de_validacion(&self) -> Result<Vec<Tramite>, WorkflowError> {
        Ok(self.store.tramites_by_estado(&[
            EstadoTramite::Pendiente,
            EstadoTramite::EnValidacion,
        ])?)
    }

    /// Seats still open on a beca, derived from persisted APROBADO rows.
    pub fn cupos_restantes(&self, id_beca: BecaId) -> Result<u32, WorkflowError> {
        let beca = self.beca(id_beca)?;
        let aprobadas = self
            .store
            .postulaciones_by_beca(id_beca)?
            .iter()
            .filter(|postulacion| postulacion.estado_postulado == EstadoPostulacion::Aprobado)
            .count() as u32;
        Ok(beca.cupos_disponibles.saturating_sub(aprobadas))
    }

    pub fn resumen_beca(&self, id_beca: BecaId) -> Result<ResumenBeca, WorkflowError> {
        let beca = self.beca(id_beca)?;
        let postulaciones = self.store.postulaciones_by_beca(id_beca)?;

        let aprobadas = postulaciones
            .iter()
            .filter(|p| p.estado_postulado == EstadoPostulacion::Aprobado)
            .count();
        let denegadas = postulaciones
            .iter()
            .filter(|p| p.estado_postulado == EstadoPostulacion::Denegado)
            .count();
        let pendientes = postulaciones
            .iter()
            .filter(|p| p.estado_postulado == EstadoPostulacion::Pendiente)
            .count();

        let puntajes: Vec<f64> = postulaciones.iter().filter_map(|p| p.puntaje_final).collect();
        let promedio_puntaje = if puntajes.is_empty() {
            None
        } else {
            Some(puntajes.iter().sum::<f64>() / puntajes.len() as f64)
        };

        let tasa_ocupacion = if beca.cupos_disponibles > 0 {
            aprobadas as f64 / beca.cupos_disponibles as f64 * 100.0
        } else {
            0.0
        };

        Ok(ResumenBeca {
            id_beca: beca.id,
            nombre: beca.nombre,
            cupos_restantes: beca.cupos_disponibles.saturating_sub(aprobadas as u32),
            cupos_disponibles: beca.cupos_disponibles,
            postulaciones: postulaciones.len(),
            aprobadas,
            denegadas,
            pendientes,
            tasa_ocupacion,
            promedio_puntaje,
        })
    }
}

const fn default_observacion(to: EstadoTramite) -> Option<&'static str> {
    match to {
        EstadoTramite::EnValidacion => Some("Validación iniciada"),
        EstadoTramite::Validado => Some("Todos los documentos correctos"),
        EstadoTramite::EnDigitalizacion => Some("Digitalización iniciada"),
        EstadoTramite::Digitalizado => {
            Some("Todos los documentos han sido digitalizados correctamente")
        }
        EstadoTramite::EnClasificacion => Some("Clasificación iniciada"),
        EstadoTramite::Clasificado => Some("Clasificación completada"),
        _ => None,
    }
}
