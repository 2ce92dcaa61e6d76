use super::domain::{EstadoTramite, TipoDocumento};

/// Legal transition targets for each state. Everything not listed here is an
/// invalid transition, including self-loops.
pub const fn targets(from: EstadoTramite) -> &'static [EstadoTramite] {
    match from {
        EstadoTramite::Pendiente => &[EstadoTramite::EnValidacion],
        EstadoTramite::EnValidacion => &[EstadoTramite::Validado, EstadoTramite::Rechazado],
        EstadoTramite::Validado => &[EstadoTramite::EnDigitalizacion],
        EstadoTramite::EnDigitalizacion => &[EstadoTramite::Digitalizado],
        EstadoTramite::Digitalizado => &[EstadoTramite::EnClasificacion],
        EstadoTramite::EnClasificacion => &[EstadoTramite::Clasificado],
        EstadoTramite::Clasificado => &[EstadoTramite::Aprobado, EstadoTramite::Denegado],
        EstadoTramite::Rechazado | EstadoTramite::Aprobado | EstadoTramite::Denegado => &[],
    }
}

pub fn allowed(from: EstadoTramite, to: EstadoTramite) -> bool {
    targets(from).contains(&to)
}

/// Guard attached to a legal edge. The service resolves each guard against
/// freshly loaded store data before applying the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeGuard {
    /// EN_VALIDACION -> RECHAZADO: a non-empty rejection observación.
    ObservacionRequerida,
    /// VALIDADO -> EN_DIGITALIZACION: at least one registered artifact.
    AlgunDocumento,
    /// EN_DIGITALIZACION -> DIGITALIZADO: the mandatory documento set is
    /// complete.
    DocumentosObligatorios,
    /// EN_CLASIFICACION -> CLASIFICADO: ranking computed for the owning beca.
    RankingComputado,
    /// CLASIFICADO -> APROBADO/DENEGADO: the target outcome matches the
    /// persisted posicion_ranking against the beca's cupos.
    ResultadoSegunRanking,
}

/// Guard required by a legal edge, if any. Callers must have checked
/// [`allowed`] first; unknown edges simply report no guard.
pub fn guard_for(from: EstadoTramite, to: EstadoTramite) -> Option<EdgeGuard> {
    match (from, to) {
        (EstadoTramite::EnValidacion, EstadoTramite::Rechazado) => {
            Some(EdgeGuard::ObservacionRequerida)
        }
        (EstadoTramite::Validado, EstadoTramite::EnDigitalizacion) => {
            Some(EdgeGuard::AlgunDocumento)
        }
        (EstadoTramite::EnDigitalizacion, EstadoTramite::Digitalizado) => {
            Some(EdgeGuard::DocumentosObligatorios)
        }
        (EstadoTramite::EnClasificacion, EstadoTramite::Clasificado) => {
            Some(EdgeGuard::RankingComputado)
        }
        (EstadoTramite::Clasificado, EstadoTramite::Aprobado)
        | (EstadoTramite::Clasificado, EstadoTramite::Denegado) => {
            Some(EdgeGuard::ResultadoSegunRanking)
        }
        _ => None,
    }
}

/// Guard condition that blocked a transition, with enough detail for the
/// caller to resolve it and retry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GuardViolation {
    #[error("faltan documentos obligatorios por digitalizar: {}", format_tipos(.missing))]
    IncompleteDocuments { missing: Vec<TipoDocumento> },
    #[error("se requiere una observación para rechazar el trámite")]
    MissingObservacion,
    #[error("el trámite no tiene documentos digitalizados")]
    SinDocumentos,
    #[error("la postulación aún no tiene posición de ranking asignada")]
    RankingPendiente,
    #[error(
        "el resultado solicitado no corresponde a la posición {posicion} con {cupos} cupos"
    )]
    ResultadoInconsistente { posicion: u32, cupos: u32 },
    #[error("configuración inválida: la beca declara {cupos} cupos disponibles")]
    InvalidConfiguration { cupos: u32 },
}

fn format_tipos(tipos: &[TipoDocumento]) -> String {
    tipos
        .iter()
        .map(|tipo| tipo.label())
        .collect::<Vec<_>>()
        .join(", ")
}
