/// Mint an access token for an operator or editor.
/// There is no login endpoint; tokens are handed out with this tool.
///
/// Usage: issue-token --code ZZ2006 --name "Zoe" [--hours 12]

use clap::Parser;

#[derive(Parser)]
#[command(name = "issue-token", about = "Issue a signed API access token")]
struct Args {
    /// User code placed in the `sub` claim (compared against ADMIN_CODES)
    #[arg(long)]
    code: String,

    /// Display name
    #[arg(long, default_value = "")]
    name: String,

    /// Token lifetime in hours
    #[arg(long, default_value_t = 12)]
    hours: i64,
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let secret = std::env::var("JWT_SECRET")
        .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable not set"))?;
    if args.hours <= 0 {
        anyhow::bail!("--hours must be positive");
    }

    let token = showcase_api::middleware::auth::issue_token(
        &secret,
        &args.code,
        &args.name,
        args.hours * 3600,
    )?;
    println!("{token}");
    Ok(())
}
