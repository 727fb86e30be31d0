// i18n: request-scoped language and the message catalog for API responses.
use std::collections::HashMap;
use std::future::Future;
use std::sync::{OnceLock, RwLock};
use tokio::task_local;

pub const SPANISH: &str = "es-ES";
pub const ENGLISH: &str = "en-US";

const MESSAGES: &[(&str, &str, &str)] = &[
    ("error.invalid_json", "JSON no válido", "invalid JSON"),
    (
        "error.db_unavailable",
        "No se pudo conectar a la base de datos",
        "could not connect to the database",
    ),
    ("error.internal", "Error interno del servidor", "internal server error"),
    ("error.read_failed", "Error al obtener datos", "failed to read records"),
    (
        "message.record_saved",
        "Registro guardado exitosamente",
        "record saved successfully",
    ),
];

#[derive(Clone, Debug)]
struct I18nState {
    default_language: String,
    aliases: HashMap<String, String>,
    messages: HashMap<&'static str, HashMap<&'static str, &'static str>>,
}

impl I18nState {
    fn new() -> Self {
        let mut aliases = HashMap::new();
        for alias in ["es", "es-es", "es-mx", "es-419"] {
            aliases.insert(alias.to_string(), SPANISH.to_string());
        }
        for alias in ["en", "en-us", "en-gb"] {
            aliases.insert(alias.to_string(), ENGLISH.to_string());
        }
        let messages = MESSAGES
            .iter()
            .map(|(key, es, en)| (*key, HashMap::from([(SPANISH, *es), (ENGLISH, *en)])))
            .collect();
        Self {
            default_language: SPANISH.to_string(),
            aliases,
            messages,
        }
    }
}

static I18N_STATE: OnceLock<RwLock<I18nState>> = OnceLock::new();

task_local! {
    static CURRENT_LANGUAGE: String;
}

fn state() -> &'static RwLock<I18nState> {
    I18N_STATE.get_or_init(|| RwLock::new(I18nState::new()))
}

/// Sets the fallback language from configuration. Unknown codes are ignored.
pub fn configure_i18n(default_language: &str) {
    let Some(normalized) = normalize_language_code(default_language) else {
        return;
    };
    if let Ok(mut guard) = state().write() {
        guard.default_language = normalized;
    }
}

/// Runs `fut` with `language` as the current language.
pub async fn with_language<F, R>(language: String, fut: F) -> R
where
    F: Future<Output = R>,
{
    CURRENT_LANGUAGE.scope(language, fut).await
}

pub fn get_language() -> String {
    if let Ok(value) = CURRENT_LANGUAGE.try_with(|lang| lang.clone()) {
        return value;
    }
    get_default_language()
}

pub fn get_default_language() -> String {
    state()
        .read()
        .map(|guard| guard.default_language.clone())
        .unwrap_or_else(|_| SPANISH.to_string())
}

/// Translates `key` into the current language; unknown keys come back unchanged.
pub fn t(key: &str) -> String {
    let language = get_language();
    let Ok(state) = state().read() else {
        return key.to_string();
    };
    let entry = state.messages.get(key);
    entry
        .and_then(|map| map.get(language.as_str()))
        .or_else(|| entry.and_then(|map| map.get(state.default_language.as_str())))
        .map(|value| value.to_string())
        .unwrap_or_else(|| key.to_string())
}

/// First recognised code in an `Accept-Language`-style list, or empty.
pub fn normalize_language(raw: &str) -> String {
    for part in raw.split(',') {
        let code = part.split(';').next().unwrap_or("").trim();
        if let Some(normalized) = normalize_language_code(code) {
            return normalized;
        }
    }
    String::new()
}

/// Picks the first candidate that names a supported language, else the default.
pub fn resolve_language<I>(candidates: I) -> String
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    for candidate in candidates {
        let text = candidate.as_ref().trim();
        if text.is_empty() {
            continue;
        }
        let normalized = normalize_language(text);
        if !normalized.is_empty() {
            return normalized;
        }
    }
    get_default_language()
}

fn normalize_language_code(value: &str) -> Option<String> {
    let cleaned = value.trim();
    if cleaned.is_empty() {
        return None;
    }
    if cleaned == SPANISH || cleaned == ENGLISH {
        return Some(cleaned.to_string());
    }
    let lower = cleaned.to_lowercase();
    let state = state().read().ok()?;
    state.aliases.get(&lower).cloned()
}
