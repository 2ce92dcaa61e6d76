//! CSV rendering of ranking outcomes for the administrative reports. Layout
//! of richer formats (Excel/PDF) is out of scope; CSV covers the roster and
//! ranking downloads.

use std::io::Write;

use super::domain::EstadoPostulacion;
use super::ranking::RankingResult;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("csv serialization failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("export io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("export produced invalid utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),
}

const RANKING_HEADERS: [&str; 5] = [
    "posicion",
    "id_postulacion",
    "id_estudiante",
    "puntaje_final",
    "resultado",
];

/// Write the full ranking of a beca, one row per eligible postulación in
/// ranked order.
pub fn write_ranking_csv<W: Write>(result: &RankingResult, out: W) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(RANKING_HEADERS)?;
    for entry in &result.assignments {
        writer.write_record([
            entry.posicion.to_string(),
            entry.id_postulacion.to_string(),
            entry.id_estudiante.to_string(),
            format!("{:.2}", entry.puntaje),
            entry.resultado.label().to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Write only the APROBADO rows: the nómina handed to payments.
pub fn write_nomina_csv<W: Write>(result: &RankingResult, out: W) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(RANKING_HEADERS)?;
    for entry in result
        .assignments
        .iter()
        .filter(|entry| entry.resultado == EstadoPostulacion::Aprobado)
    {
        writer.write_record([
            entry.posicion.to_string(),
            entry.id_postulacion.to_string(),
            entry.id_estudiante.to_string(),
            format!("{:.2}", entry.puntaje),
            entry.resultado.label().to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Render a ranking to an in-memory CSV string, as served by the export
/// endpoint.
pub fn ranking_csv_string(result: &RankingResult) -> Result<String, ExportError> {
    let mut buffer = Vec::new();
    write_ranking_csv(result, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
