use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(
    /// Identifier for a trámite (case file).
    TramiteId
);
id_newtype!(
    /// Identifier for a postulación (scholarship application).
    PostulacionId
);
id_newtype!(
    /// Identifier for a beca (scholarship offering).
    BecaId
);
id_newtype!(
    /// Identifier for a convocatoria (call for applications).
    ConvocatoriaId
);
id_newtype!(
    /// Identifier for a socioeconomic form snapshot.
    FormularioId
);
id_newtype!(
    /// Identifier for an estudiante account.
    EstudianteId
);
id_newtype!(
    /// Identifier for any acting user (operator or student).
    UserId
);
id_newtype!(
    /// Identifier for a digitized documento record.
    DocumentoId
);

/// Lifecycle states of a trámite, in administrative processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EstadoTramite {
    Pendiente,
    EnValidacion,
    Validado,
    Rechazado,
    EnDigitalizacion,
    Digitalizado,
    EnClasificacion,
    Clasificado,
    Aprobado,
    Denegado,
}

impl EstadoTramite {
    /// State assigned when a trámite is created.
    pub const INICIAL: EstadoTramite = EstadoTramite::Pendiente;

    /// All states, used by table-driven transition checks.
    pub const ALL: [EstadoTramite; 10] = [
        EstadoTramite::Pendiente,
        EstadoTramite::EnValidacion,
        EstadoTramite::Validado,
        EstadoTramite::Rechazado,
        EstadoTramite::EnDigitalizacion,
        EstadoTramite::Digitalizado,
        EstadoTramite::EnClasificacion,
        EstadoTramite::Clasificado,
        EstadoTramite::Aprobado,
        EstadoTramite::Denegado,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            EstadoTramite::Pendiente => "PENDIENTE",
            EstadoTramite::EnValidacion => "EN_VALIDACION",
            EstadoTramite::Validado => "VALIDADO",
            EstadoTramite::Rechazado => "RECHAZADO",
            EstadoTramite::EnDigitalizacion => "EN_DIGITALIZACION",
            EstadoTramite::Digitalizado => "DIGITALIZADO",
            EstadoTramite::EnClasificacion => "EN_CLASIFICACION",
            EstadoTramite::Clasificado => "CLASIFICADO",
            EstadoTramite::Aprobado => "APROBADO",
            EstadoTramite::Denegado => "DENEGADO",
        }
    }

    pub const fn descripcion(self) -> &'static str {
        match self {
            EstadoTramite::Pendiente => "Trámite registrado, esperando validación",
            EstadoTramite::EnValidacion => "Documentación en proceso de validación",
            EstadoTramite::Validado => "Documentación validada correctamente",
            EstadoTramite::Rechazado => "Documentación rechazada",
            EstadoTramite::EnDigitalizacion => "Documentos en proceso de digitalización",
            EstadoTramite::Digitalizado => "Expediente digitalizado",
            EstadoTramite::EnClasificacion => "En proceso de clasificación socioeconómica",
            EstadoTramite::Clasificado => "Clasificación completada",
            EstadoTramite::Aprobado => "Beca aprobada",
            EstadoTramite::Denegado => "Beca denegada",
        }
    }

    /// APROBADO and DENEGADO end the workflow. RECHAZADO is a dead end too,
    /// but re-initiation happens outside this machine, so it is listed here.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            EstadoTramite::Aprobado | EstadoTramite::Denegado | EstadoTramite::Rechazado
        )
    }
}

impl fmt::Display for EstadoTramite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fixed catalog of documento types collected during digitization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TipoDocumento {
    Ci,
    Kardex,
    ComprobanteDomicilio,
    CertificadoIngresos,
    Otro,
}

impl TipoDocumento {
    pub const fn label(self) -> &'static str {
        match self {
            TipoDocumento::Ci => "CI",
            TipoDocumento::Kardex => "KARDEX",
            TipoDocumento::ComprobanteDomicilio => "COMPROBANTE_DOMICILIO",
            TipoDocumento::CertificadoIngresos => "CERTIFICADO_INGRESOS",
            TipoDocumento::Otro => "OTRO",
        }
    }

    pub const fn nombre(self) -> &'static str {
        match self {
            TipoDocumento::Ci => "Cédula de Identidad",
            TipoDocumento::Kardex => "Kardex Académico",
            TipoDocumento::ComprobanteDomicilio => "Comprobante de Domicilio",
            TipoDocumento::CertificadoIngresos => "Certificado de Ingresos",
            TipoDocumento::Otro => "Otro documento",
        }
    }

    pub const fn obligatorio(self) -> bool {
        matches!(
            self,
            TipoDocumento::Ci | TipoDocumento::Kardex | TipoDocumento::ComprobanteDomicilio
        )
    }
}

impl fmt::Display for TipoDocumento {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome recorded on the postulación itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EstadoPostulacion {
    Pendiente,
    Aprobado,
    Denegado,
    Rechazado,
}

impl EstadoPostulacion {
    pub const fn label(self) -> &'static str {
        match self {
            EstadoPostulacion::Pendiente => "PENDIENTE",
            EstadoPostulacion::Aprobado => "APROBADO",
            EstadoPostulacion::Denegado => "DENEGADO",
            EstadoPostulacion::Rechazado => "RECHAZADO",
        }
    }
}

impl fmt::Display for EstadoPostulacion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Case file tracking one postulación through administrative processing.
///
/// Relationships (documentos, historial, the owning postulación) are fetched
/// explicitly through the [`CaseStore`](super::repository::CaseStore) rather
/// than held here, so each operation works on data it loaded itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tramite {
    pub id: TramiteId,
    pub id_postulacion: PostulacionId,
    pub codigo: String,
    pub estado_actual: EstadoTramite,
    pub clasificado: bool,
    pub fecha_creacion: DateTime<Utc>,
    pub fecha_clasificacion: Option<DateTime<Utc>>,
}

/// One immutable audit record. `estado_anterior` is `None` only for the
/// creation entry; `revisado_por` is `None` for system-initiated changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorialEntry {
    pub estado_anterior: Option<EstadoTramite>,
    pub estado_nuevo: EstadoTramite,
    pub observaciones: Option<String>,
    pub revisado_por: Option<UserId>,
    pub fecha: DateTime<Utc>,
}

/// Opaque reference into the external document storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef(pub String);

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A digitized documento artifact tied to a trámite. At most one validated
/// documento exists per (trámite, tipo); re-registration supersedes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Documento {
    pub id: DocumentoId,
    pub id_tramite: TramiteId,
    pub tipo: TipoDocumento,
    pub nombre_archivo: String,
    pub artifact: ArtifactRef,
    pub tamanho_bytes: u64,
    pub validado: bool,
    pub fecha_subida: DateTime<Utc>,
    pub subido_por: Option<UserId>,
}

/// One student's application to one beca within one convocatoria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Postulacion {
    pub id: PostulacionId,
    pub id_estudiante: EstudianteId,
    pub id_beca: BecaId,
    pub id_convocatoria: ConvocatoriaId,
    pub id_formulario: FormularioId,
    pub fecha_postulacion: DateTime<Utc>,
    pub estado_postulado: EstadoPostulacion,
    pub puntaje_final: Option<f64>,
    pub posicion_ranking: Option<u32>,
    pub motivo_rechazo: Option<String>,
}

impl Postulacion {
    /// Eligible for classification once a score has been computed for it.
    pub fn clasificable(&self) -> bool {
        self.puntaje_final.is_some()
    }
}

/// A scholarship offering with a fixed seat count and stipend amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beca {
    pub id: BecaId,
    pub id_convocatoria: ConvocatoriaId,
    pub codigo: String,
    pub nombre: String,
    pub monto: f64,
    pub cupos_disponibles: u32,
}

/// Channel-agnostic notification payload handed to the external publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notificacion {
    pub id_estudiante: EstudianteId,
    pub id_tramite: Option<TramiteId>,
    pub tipo: TipoNotificacion,
    pub titulo: String,
    pub mensaje: String,
    pub canal: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TipoNotificacion {
    Alerta,
    Informacion,
    Resultado,
}

impl TipoNotificacion {
    pub const fn label(self) -> &'static str {
        match self {
            TipoNotificacion::Alerta => "ALERTA",
            TipoNotificacion::Informacion => "INFORMACION",
            TipoNotificacion::Resultado => "RESULTADO",
        }
    }
}
