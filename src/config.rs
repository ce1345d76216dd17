use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_ttl_minutes: i64,
    pub reset_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechConfig {
    pub key: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub mail: MailConfig,
    pub ai: AiConfig,
    pub speech: SpeechConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "ieltsmind".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "ieltsmind-users".into()),
            access_ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
            // Reset tokens only gate one password change, so they live much shorter.
            reset_ttl_minutes: std::env::var("JWT_RESET_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(15),
        };
        let mail = MailConfig {
            api_url: std::env::var("MAIL_API_URL").unwrap_or_default(),
            api_key: std::env::var("MAIL_API_KEY").unwrap_or_default(),
            from: std::env::var("MAIL_FROM").unwrap_or_default(),
            timeout_secs: std::env::var("MAIL_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5),
        };
        let ai = AiConfig {
            api_key: std::env::var("GOOGLE_API_KEY").ok(),
            model: std::env::var("AI_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".into()),
            base_url: std::env::var("AI_BASE_URL")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into()),
        };
        let speech = SpeechConfig {
            key: std::env::var("AZURE_SPEECH_KEY").ok(),
            region: std::env::var("AZURE_SPEECH_REGION").ok(),
        };
        Ok(Self {
            database_url,
            jwt,
            mail,
            ai,
            speech,
        })
    }
}
