//! Document gate: decides whether a trámite's digitized artifact set allows
//! it to advance, based on the fixed documento catalog.

use super::domain::{Documento, TipoDocumento};

/// Types that must be digitized before a trámite can leave EN_DIGITALIZACION.
/// CERTIFICADO_INGRESOS and OTRO never block completion.
pub const OBLIGATORIOS: [TipoDocumento; 3] = [
    TipoDocumento::Ci,
    TipoDocumento::Kardex,
    TipoDocumento::ComprobanteDomicilio,
];

/// The active (validated) documento for a type, if any. Registration
/// supersedes rather than duplicates, so the store keeps one row per type;
/// this still picks the latest upload defensively should duplicates appear.
pub fn active_for_tipo(documentos: &[Documento], tipo: TipoDocumento) -> Option<&Documento> {
    documentos
        .iter()
        .filter(|doc| doc.tipo == tipo && doc.validado)
        .max_by_key(|doc| doc.fecha_subida)
}

/// Mandatory types without a validated artifact, in catalog order.
pub fn missing_obligatorios(documentos: &[Documento]) -> Vec<TipoDocumento> {
    OBLIGATORIOS
        .iter()
        .copied()
        .filter(|tipo| active_for_tipo(documentos, *tipo).is_none())
        .collect()
}

/// True iff every mandatory type has a validated artifact.
pub fn is_complete(documentos: &[Documento]) -> bool {
    missing_obligatorios(documentos).is_empty()
}

/// True iff at least one artifact has been registered, which is what the
/// VALIDADO -> EN_DIGITALIZACION edge requires.
pub fn has_artifact(documentos: &[Documento]) -> bool {
    !documentos.is_empty()
}
