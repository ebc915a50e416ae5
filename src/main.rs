use keyward::cli;

/// Variables taken from `.env` into the process environment. Everything
/// else in the file stays with the environment backend's cache.
const BOOTSTRAP_PREFIXES: [&str; 3] = ["KEYWARD__", "VAULT_", "DOCKER_SECRETS"];

/// Load settings variables from `.env`, never overriding the real environment.
fn load_bootstrap_env() {
    let entries = match dotenvy::dotenv_iter() {
        Ok(entries) => entries,
        // No .env file is the common case.
        Err(e) if e.not_found() => return,
        Err(e) => {
            eprintln!("Warning: Error loading .env file: {}", e);
            return;
        }
    };

    for entry in entries {
        match entry {
            Ok((key, value)) => {
                let is_bootstrap = BOOTSTRAP_PREFIXES.iter().any(|prefix| key.starts_with(prefix));
                if is_bootstrap && std::env::var_os(&key).is_none() {
                    std::env::set_var(key, value);
                }
            }
            // The parse error quotes the line, which may hold a value.
            Err(_) => eprintln!("Warning: Skipping an invalid .env line"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_bootstrap_env();
    cli::run_cli().await
}
