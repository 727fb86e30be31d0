// Table layout shared by both backends.

pub const TABLE_NAME: &str = "registros_servicio";

/// Longest completion tag the column accepts.
pub const COMPLETION_TYPE_MAX_LEN: usize = 20;

pub const POSTGRES_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS registros_servicio (
  id BIGSERIAL PRIMARY KEY,
  "timestamp" TIMESTAMP NOT NULL,
  ciclo_id BIGINT NOT NULL,
  duracion_servicio_s BIGINT NOT NULL,
  duracion_espera_s BIGINT NOT NULL,
  finalizacion_tipo VARCHAR(20) NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_registros_servicio_recent
  ON registros_servicio ("timestamp" DESC, id DESC);
"#;

pub const SQLITE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS registros_servicio (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  timestamp TEXT NOT NULL,
  ciclo_id INTEGER NOT NULL,
  duracion_servicio_s INTEGER NOT NULL,
  duracion_espera_s INTEGER NOT NULL,
  finalizacion_tipo TEXT NOT NULL CHECK (length(finalizacion_tipo) <= 20)
);
CREATE INDEX IF NOT EXISTS idx_registros_servicio_recent
  ON registros_servicio (timestamp, id);
"#;

/// Columns in the order every SELECT returns them.
pub const RECORD_COLUMNS: &str =
    r#"id, "timestamp", ciclo_id, duracion_servicio_s, duracion_espera_s, finalizacion_tipo"#;
