// Binary entry point for bio_exec
// This is a thin wrapper that delegates to the library implementation

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    match bio_exec::shell::run().await {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("bio_exec fatal error: {:#}", e);
            Err(e)
        }
    }
}
