use chrono::{TimeZone, Utc};
use clap::Args;
use serde_json::json;
use uuid::Uuid;

use crate::auth::{generate_jwt, Claims, Role};
use crate::cli::{utils, OutputFormat};
use crate::config;

#[derive(Args)]
pub struct TokenArgs {
    #[arg(help = "User id the token identifies")]
    pub user_id: Uuid,

    #[arg(long, help = "principal, teacher or student")]
    pub role: Role,

    #[arg(long, help = "Lifetime in hours (defaults to the configured expiry)")]
    pub hours: Option<u64>,
}

pub fn handle(args: TokenArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let security = &config::config().security;
    let hours = args.hours.unwrap_or(security.jwt_expiry_hours);

    let claims = Claims::new(args.user_id, args.role, hours);
    let token = generate_jwt(&claims, &security.jwt_secret)?;
    let expires_at = Utc.timestamp_opt(claims.exp, 0).single();

    match output_format {
        OutputFormat::Json => utils::output_json(&json!({
            "token": token,
            "user_id": args.user_id,
            "role": args.role.as_str(),
            "expires_at": expires_at,
        })),
        OutputFormat::Text => {
            println!("{}", token);
            Ok(())
        }
    }
}
