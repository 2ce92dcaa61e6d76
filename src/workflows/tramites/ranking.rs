//! Ranking engine: turns a beca's scored applicant pool into a total order
//! and a binary APROBADO/DENEGADO outcome under the cupos constraint.

use serde::{Deserialize, Serialize};

use super::domain::{Beca, BecaId, EstadoPostulacion, EstudianteId, Postulacion, PostulacionId};
use super::machine::GuardViolation;

/// One row of a computed ranking, 1-based position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingAssignment {
    pub id_postulacion: PostulacionId,
    pub id_estudiante: EstudianteId,
    pub posicion: u32,
    pub puntaje: f64,
    pub resultado: EstadoPostulacion,
}

/// Full recomputation output for one beca. Positions cover every eligible
/// postulación; nothing incremental survives from prior runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingResult {
    pub id_beca: BecaId,
    pub cupos_disponibles: u32,
    pub assignments: Vec<RankingAssignment>,
}

impl RankingResult {
    pub fn aprobados(&self) -> impl Iterator<Item = &RankingAssignment> {
        self.assignments
            .iter()
            .filter(|entry| entry.resultado == EstadoPostulacion::Aprobado)
    }
}

/// Rank the eligible pool of `beca`: descending by puntaje_final, ties broken
/// by earlier fecha_postulacion, then by lower postulación id. The first
/// `cupos_disponibles` positions are APROBADO, the rest DENEGADO. A pool
/// smaller than the seat count approves everyone and leaves seats unfilled.
///
/// Postulaciones without a puntaje_final are silently excluded; they have not
/// been through classification yet.
pub fn compute_ranking(
    beca: &Beca,
    postulaciones: Vec<Postulacion>,
) -> Result<RankingResult, GuardViolation> {
    if beca.cupos_disponibles == 0 {
        return Err(GuardViolation::InvalidConfiguration {
            cupos: beca.cupos_disponibles,
        });
    }

    let mut eligibles: Vec<(Postulacion, f64)> = postulaciones
        .into_iter()
        .filter_map(|postulacion| {
            let puntaje = postulacion.puntaje_final?;
            Some((postulacion, puntaje))
        })
        .collect();

    eligibles.sort_by(|(a, puntaje_a), (b, puntaje_b)| {
        puntaje_b
            .total_cmp(puntaje_a)
            .then_with(|| a.fecha_postulacion.cmp(&b.fecha_postulacion))
            .then_with(|| a.id.cmp(&b.id))
    });

    let assignments = eligibles
        .into_iter()
        .enumerate()
        .map(|(index, (postulacion, puntaje))| {
            let posicion = index as u32 + 1;
            let resultado = if posicion <= beca.cupos_disponibles {
                EstadoPostulacion::Aprobado
            } else {
                EstadoPostulacion::Denegado
            };
            RankingAssignment {
                id_postulacion: postulacion.id,
                id_estudiante: postulacion.id_estudiante,
                posicion,
                puntaje,
                resultado,
            }
        })
        .collect();

    Ok(RankingResult {
        id_beca: beca.id,
        cupos_disponibles: beca.cupos_disponibles,
        assignments,
    })
}
