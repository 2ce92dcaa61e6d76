//! In-memory collaborator implementations backing the demo, the default
//! server wiring, and the test suites. A single mutex around the whole data
//! set gives every store call the transactional scope the workflow requires.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use super::domain::{
    ArtifactRef, Beca, BecaId, Documento, EstadoPostulacion, EstadoTramite, HistorialEntry,
    Notificacion, Postulacion, PostulacionId, Tramite, TramiteId,
};
use super::ranking::RankingAssignment;
use super::repository::{
    CaseStore, CaseStoreError, ClassificationTrigger, DocumentStorage, NotificationError,
    NotificationPublisher, StorageError,
};

#[derive(Default)]
struct StoreInner {
    tramites: HashMap<TramiteId, Tramite>,
    historial: HashMap<TramiteId, Vec<HistorialEntry>>,
    documentos: HashMap<TramiteId, Vec<Documento>>,
    postulaciones: HashMap<PostulacionId, Postulacion>,
    becas: HashMap<BecaId, Beca>,
}

/// Mutex-backed [`CaseStore`].
#[derive(Default, Clone)]
pub struct InMemoryCaseStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl InMemoryCaseStore {
    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().expect("case store mutex poisoned")
    }
}

impl CaseStore for InMemoryCaseStore {
    fn insert_tramite(
        &self,
        tramite: Tramite,
        entry: HistorialEntry,
    ) -> Result<Tramite, CaseStoreError> {
        let mut guard = self.lock();
        if guard.tramites.contains_key(&tramite.id) {
            return Err(CaseStoreError::Conflict);
        }
        let duplicate = guard.tramites.values().any(|existing| {
            existing.id_postulacion == tramite.id_postulacion || existing.codigo == tramite.codigo
        });
        if duplicate {
            return Err(CaseStoreError::Conflict);
        }
        guard.historial.insert(tramite.id, vec![entry]);
        guard.tramites.insert(tramite.id, tramite.clone());
        Ok(tramite)
    }

    fn fetch_tramite(&self, id: TramiteId) -> Result<Option<Tramite>, CaseStoreError> {
        Ok(self.lock().tramites.get(&id).cloned())
    }

    fn fetch_tramite_by_codigo(&self, codigo: &str) -> Result<Option<Tramite>, CaseStoreError> {
        Ok(self
            .lock()
            .tramites
            .values()
            .find(|tramite| tramite.codigo == codigo)
            .cloned())
    }

    fn fetch_tramite_by_postulacion(
        &self,
        id: PostulacionId,
    ) -> Result<Option<Tramite>, CaseStoreError> {
        Ok(self
            .lock()
            .tramites
            .values()
            .find(|tramite| tramite.id_postulacion == id)
            .cloned())
    }

    fn tramites_by_estado(
        &self,
        estados: &[EstadoTramite],
    ) -> Result<Vec<Tramite>, CaseStoreError> {
        let guard = self.lock();
        let mut found: Vec<Tramite> = guard
            .tramites
            .values()
            .filter(|tramite| estados.contains(&tramite.estado_actual))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.fecha_creacion.cmp(&b.fecha_creacion).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    fn apply_transition(
        &self,
        id: TramiteId,
        expected: EstadoTramite,
        entry: HistorialEntry,
    ) -> Result<Tramite, CaseStoreError> {
        let mut guard = self.lock();
        let tramite = guard.tramites.get_mut(&id).ok_or(CaseStoreError::NotFound)?;
        if tramite.estado_actual != expected {
            return Err(CaseStoreError::StaleState {
                expected,
                actual: tramite.estado_actual,
            });
        }
        tramite.estado_actual = entry.estado_nuevo;
        let updated = tramite.clone();
        guard.historial.entry(id).or_default().push(entry);
        Ok(updated)
    }

    fn set_clasificado(
        &self,
        id: TramiteId,
        fecha: DateTime<Utc>,
    ) -> Result<Tramite, CaseStoreError> {
        let mut guard = self.lock();
        let tramite = guard.tramites.get_mut(&id).ok_or(CaseStoreError::NotFound)?;
        tramite.clasificado = true;
        tramite.fecha_clasificacion = Some(fecha);
        Ok(tramite.clone())
    }

    fn historial(&self, id: TramiteId) -> Result<Vec<HistorialEntry>, CaseStoreError> {
        let guard = self.lock();
        if !guard.tramites.contains_key(&id) {
            return Err(CaseStoreError::NotFound);
        }
        Ok(guard.historial.get(&id).cloned().unwrap_or_default())
    }

    fn upsert_documento(&self, documento: Documento) -> Result<Documento, CaseStoreError> {
        let mut guard = self.lock();
        if !guard.tramites.contains_key(&documento.id_tramite) {
            return Err(CaseStoreError::NotFound);
        }
        let entries = guard.documentos.entry(documento.id_tramite).or_default();
        entries.retain(|existing| existing.tipo != documento.tipo);
        entries.push(documento.clone());
        Ok(documento)
    }

    fn validar_documentos(&self, id: TramiteId) -> Result<Vec<Documento>, CaseStoreError> {
        let mut guard = self.lock();
        if !guard.tramites.contains_key(&id) {
            return Err(CaseStoreError::NotFound);
        }
        let entries = guard.documentos.entry(id).or_default();
        for documento in entries.iter_mut() {
            documento.validado = true;
        }
        Ok(entries.clone())
    }

    fn documentos(&self, id: TramiteId) -> Result<Vec<Documento>, CaseStoreError> {
        let guard = self.lock();
        if !guard.tramites.contains_key(&id) {
            return Err(CaseStoreError::NotFound);
        }
        Ok(guard.documentos.get(&id).cloned().unwrap_or_default())
    }

    fn insert_postulacion(
        &self,
        postulacion: Postulacion,
    ) -> Result<Postulacion, CaseStoreError> {
        let mut guard = self.lock();
        if guard.postulaciones.contains_key(&postulacion.id) {
            return Err(CaseStoreError::Conflict);
        }
        let duplicate = guard.postulaciones.values().any(|existing| {
            existing.id_estudiante == postulacion.id_estudiante
                && existing.id_beca == postulacion.id_beca
        });
        if duplicate {
            return Err(CaseStoreError::Conflict);
        }
        guard.postulaciones.insert(postulacion.id, postulacion.clone());
        Ok(postulacion)
    }

    fn fetch_postulacion(
        &self,
        id: PostulacionId,
    ) -> Result<Option<Postulacion>, CaseStoreError> {
        Ok(self.lock().postulaciones.get(&id).cloned())
    }

    fn update_postulacion(&self, postulacion: Postulacion) -> Result<(), CaseStoreError> {
        let mut guard = self.lock();
        if !guard.postulaciones.contains_key(&postulacion.id) {
            return Err(CaseStoreError::NotFound);
        }
        guard.postulaciones.insert(postulacion.id, postulacion);
        Ok(())
    }

    fn postulaciones_by_beca(&self, id: BecaId) -> Result<Vec<Postulacion>, CaseStoreError> {
        let guard = self.lock();
        let mut found: Vec<Postulacion> = guard
            .postulaciones
            .values()
            .filter(|postulacion| postulacion.id_beca == id)
            .cloned()
            .collect();
        found.sort_by_key(|postulacion| postulacion.id);
        Ok(found)
    }

    fn insert_beca(&self, beca: Beca) -> Result<Beca, CaseStoreError> {
        let mut guard = self.lock();
        if guard.becas.contains_key(&beca.id) {
            return Err(CaseStoreError::Conflict);
        }
        guard.becas.insert(beca.id, beca.clone());
        Ok(beca)
    }

    fn fetch_beca(&self, id: BecaId) -> Result<Option<Beca>, CaseStoreError> {
        Ok(self.lock().becas.get(&id).cloned())
    }

    fn apply_ranking(
        &self,
        id_beca: BecaId,
        assignments: &[RankingAssignment],
    ) -> Result<(), CaseStoreError> {
        let mut guard = self.lock();
        let assigned: HashMap<PostulacionId, &RankingAssignment> = assignments
            .iter()
            .map(|entry| (entry.id_postulacion, entry))
            .collect();
        for postulacion in guard
            .postulaciones
            .values_mut()
            .filter(|postulacion| postulacion.id_beca == id_beca)
        {
            match assigned.get(&postulacion.id) {
                Some(entry) => {
                    postulacion.posicion_ranking = Some(entry.posicion);
                    postulacion.estado_postulado = entry.resultado;
                }
                None if postulacion.posicion_ranking.is_some() => {
                    // Stale position from a prior run; the recomputation no
                    // longer covers this postulación.
                    postulacion.posicion_ranking = None;
                    postulacion.estado_postulado = EstadoPostulacion::Pendiente;
                }
                None => {}
            }
        }
        Ok(())
    }
}

/// Publisher that records every notification for later inspection.
#[derive(Default, Clone)]
pub struct InMemoryNotificationPublisher {
    events: Arc<Mutex<Vec<Notificacion>>>,
}

impl InMemoryNotificationPublisher {
    pub fn events(&self) -> Vec<Notificacion> {
        self.events.lock().expect("notification mutex poisoned").clone()
    }
}

impl NotificationPublisher for InMemoryNotificationPublisher {
    fn publish(&self, notificacion: Notificacion) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .push(notificacion);
        Ok(())
    }
}

/// Blob storage backed by a map, handing out sequential artifact refs.
#[derive(Default, Clone)]
pub struct InMemoryDocumentStorage {
    blobs: Arc<Mutex<HashMap<ArtifactRef, Vec<u8>>>>,
    sequence: Arc<AtomicU64>,
}

impl DocumentStorage for InMemoryDocumentStorage {
    fn store(&self, bytes: &[u8], nombre_archivo: &str) -> Result<ArtifactRef, StorageError> {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let artifact = ArtifactRef(format!("mem://documentos/{seq:06}/{nombre_archivo}"));
        self.blobs
            .lock()
            .expect("storage mutex poisoned")
            .insert(artifact.clone(), bytes.to_vec());
        Ok(artifact)
    }

    fn retrieve(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .lock()
            .expect("storage mutex poisoned")
            .get(artifact)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(artifact.clone()))
    }

    fn delete(&self, artifact: &ArtifactRef) -> Result<(), StorageError> {
        self.blobs
            .lock()
            .expect("storage mutex poisoned")
            .remove(artifact)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(artifact.clone()))
    }
}

/// Trigger that records which trámites signaled digitization readiness.
#[derive(Default, Clone)]
pub struct RecordingClassificationTrigger {
    fired: Arc<Mutex<Vec<(TramiteId, BecaId)>>>,
}

impl RecordingClassificationTrigger {
    pub fn fired(&self) -> Vec<(TramiteId, BecaId)> {
        self.fired.lock().expect("trigger mutex poisoned").clone()
    }
}

impl ClassificationTrigger for RecordingClassificationTrigger {
    fn tramite_digitalizado(&self, id_tramite: TramiteId, id_beca: BecaId) {
        self.fired
            .lock()
            .expect("trigger mutex poisoned")
            .push((id_tramite, id_beca));
    }
}
