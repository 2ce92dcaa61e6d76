use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use dubss::config::AppConfig;
use dubss::error::AppError;
use dubss::workflows::tramites::{
    export, Beca, BecaId, CaseStore, ConvocatoriaId, EstadoTramite, EstudianteId, FormularioId,
    NuevaPostulacion, TipoDocumento, Tramite, UserId,
};

use crate::infra::{build_workflow_service, InMemoryWorkflowService};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Write the resulting ranking CSV under the configured export directory.
    #[arg(long)]
    pub(crate) export_csv: bool,
    /// Skip the rejected-applicant branch of the walkthrough.
    #[arg(long)]
    pub(crate) skip_rechazo: bool,
}

const OPERADOR: UserId = UserId(9001);

/// Seeded walkthrough: one beca with two cupos, three scored applicants and
/// one rejection, driven through the entire lifecycle.
pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let (service, store, notifier) = build_workflow_service();

    let beca = Beca {
        id: BecaId(1),
        id_convocatoria: ConvocatoriaId(1),
        codigo: "BECA-COMEDOR".to_string(),
        nombre: "Beca Comedor Universitario".to_string(),
        monto: 450.0,
        cupos_disponibles: 2,
    };
    store
        .insert_beca(beca.clone())
        .map_err(dubss::workflows::tramites::WorkflowError::from)?;

    println!("== DUBSS demo: {} ({} cupos) ==", beca.nombre, beca.cupos_disponibles);

    let puntajes = [92.5, 78.0, 92.5];
    let mut aprobables = Vec::new();
    for (index, puntaje) in puntajes.iter().enumerate() {
        let (postulacion, tramite) = service.create_postulacion(NuevaPostulacion {
            id_estudiante: EstudianteId(100 + index as u64),
            id_beca: beca.id,
            id_formulario: FormularioId(500 + index as u64),
            creado_por: None,
        })?;
        println!(
            "postulación {} -> trámite {} ({})",
            postulacion.id,
            tramite.codigo,
            tramite.estado_actual.label()
        );
        service.asignar_puntaje(postulacion.id, *puntaje)?;
        digitalizar(&service, &tramite)?;
        aprobables.push(tramite);
    }

    if !args.skip_rechazo {
        let (postulacion, tramite) = service.create_postulacion(NuevaPostulacion {
            id_estudiante: EstudianteId(200),
            id_beca: beca.id,
            id_formulario: FormularioId(600),
            creado_por: None,
        })?;
        service.transition(
            tramite.id,
            EstadoTramite::EnValidacion,
            Some(OPERADOR),
            None,
        )?;
        service.transition(
            tramite.id,
            EstadoTramite::Rechazado,
            Some(OPERADOR),
            Some("Kardex ilegible, presentar nuevamente".to_string()),
        )?;
        println!(
            "postulación {} -> trámite {} rechazado en validación",
            postulacion.id, tramite.codigo
        );
    }

    service.start_clasificacion(beca.id, Some(OPERADOR))?;
    let ranking = service.rank(beca.id, Some(OPERADOR))?;

    println!("\n-- ranking --");
    for entry in &ranking.assignments {
        println!(
            "  #{} postulación {} puntaje {:.2} -> {}",
            entry.posicion,
            entry.id_postulacion,
            entry.puntaje,
            entry.resultado.label()
        );
    }

    let resumen = service.resumen_beca(beca.id)?;
    println!(
        "\ncupos: {}/{} ocupados, {} restantes, promedio {:.2}",
        resumen.aprobadas,
        resumen.cupos_disponibles,
        resumen.cupos_restantes,
        resumen.promedio_puntaje.unwrap_or(0.0)
    );

    println!("\n-- historial {} --", aprobables[0].codigo);
    for entry in service.historial(aprobables[0].id)? {
        let desde = entry
            .estado_anterior
            .map(EstadoTramite::label)
            .unwrap_or("-");
        println!(
            "  {} -> {}: {}",
            desde,
            entry.estado_nuevo.label(),
            entry.observaciones.as_deref().unwrap_or("")
        );
    }

    println!("\nnotificaciones emitidas: {}", notifier.events().len());

    if args.export_csv {
        let path = write_ranking(&config.export.dir, &beca, &ranking)?;
        println!("ranking exportado a {}", path.display());
    }

    Ok(())
}

fn digitalizar(
    service: &Arc<InMemoryWorkflowService>,
    tramite: &Tramite,
) -> Result<(), AppError> {
    service.transition(
        tramite.id,
        EstadoTramite::EnValidacion,
        Some(OPERADOR),
        None,
    )?;
    service.transition(tramite.id, EstadoTramite::Validado, Some(OPERADOR), None)?;

    for (tipo, contenido) in [
        (TipoDocumento::Ci, "ci-escaneado"),
        (TipoDocumento::Kardex, "kardex-escaneado"),
        (TipoDocumento::ComprobanteDomicilio, "factura-luz"),
    ] {
        service.upload_documento(
            tramite.id,
            tipo,
            contenido.as_bytes(),
            "escaneo.pdf",
            Some(OPERADOR),
        )?;
    }

    service.transition(
        tramite.id,
        EstadoTramite::Digitalizado,
        Some(OPERADOR),
        None,
    )?;
    Ok(())
}

fn write_ranking(
    dir: &PathBuf,
    beca: &Beca,
    ranking: &dubss::workflows::tramites::RankingResult,
) -> Result<PathBuf, AppError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("ranking_{}.csv", beca.codigo.to_lowercase()));
    let file = fs::File::create(&path)?;
    export::write_ranking_csv(ranking, file)?;
    Ok(path)
}
