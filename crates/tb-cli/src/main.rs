use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use tb_client::HttpClient;

const DEFAULT_API_URL: &str = "http://localhost:8080";

#[derive(Parser)]
#[command(name = "tb", version, about = "Memorial tribute board")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and pages
    Serve {
        /// Keep tributes and photos in process memory
        #[arg(long, default_value_t = false)]
        in_memory: bool,
    },
    Migrate,
    Admin {
        #[command(subcommand)]
        command: AdminCommand,
    },
    Tributes {
        #[command(subcommand)]
        command: TributesCommand,
    },
}

#[derive(Subcommand)]
enum AdminCommand {
    /// Print an argon2 hash suitable for ADMIN_PASSWORD_HASH
    HashPassword {
        #[arg(long, env = "TB_ADMIN_PASSWORD")]
        password: String,
    },
}

#[derive(Args, Clone)]
struct ApiArgs {
    /// Base URL of a running tribute API
    #[arg(long, default_value = DEFAULT_API_URL, env = "TRIBUTES_API_URL")]
    api_url: String,
}

#[derive(Subcommand)]
enum TributesCommand {
    List {
        #[command(flatten)]
        api: ApiArgs,

        /// Pretty-print JSON output
        #[arg(long, default_value_t = false)]
        pretty: bool,
    },
    Delete {
        #[command(flatten)]
        api: ApiArgs,

        #[arg(long)]
        id: String,

        /// Photo URL to remove along with the tribute
        #[arg(long)]
        photo_url: Option<String>,

        #[arg(long, env = "ADMIN_SECRET_KEY")]
        auth_key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { in_memory } => {
            let config = tb_api::load_config(in_memory)?;
            tb_api::run(config).await?;
        }
        Commands::Migrate => {
            tb_core::logging::init("tb-cli");
            let database_url = tb_core::config::required_secret("DATABASE_URL")?;
            let pool = tb_core::db::connect(&database_url).await?;
            tb_core::db::migrate(&pool).await?;
        }
        Commands::Admin { command } => match command {
            AdminCommand::HashPassword { password } => {
                if password.is_empty() {
                    return Err(anyhow!("password is empty"));
                }
                println!("{}", tb_core::admin::hash_password(&password)?);
            }
        },
        Commands::Tributes { command } => {
            tb_core::logging::init_cli();
            match command {
                TributesCommand::List { api, pretty } => {
                    let client = HttpClient::new(api.api_url)?;
                    let tributes = client.list_tributes().await?;
                    let rendered = if pretty {
                        serde_json::to_string_pretty(&tributes)?
                    } else {
                        serde_json::to_string(&tributes)?
                    };
                    println!("{rendered}");
                }
                TributesCommand::Delete {
                    api,
                    id,
                    photo_url,
                    auth_key,
                } => {
                    let client = HttpClient::new(api.api_url)?;
                    client
                        .delete_with_key(&id, photo_url.as_deref(), &auth_key)
                        .await?;
                    let output = serde_json::json!({ "deleted": id });
                    println!("{}", serde_json::to_string(&output)?);
                }
            }
        }
    }

    Ok(())
}
