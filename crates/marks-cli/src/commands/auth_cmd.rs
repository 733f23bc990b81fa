use marks_core::config::ClientConfig;

use crate::auth::{auth_client, clear_stored_session, current_session, load_stored_session};
use crate::cli::AuthCommands;
use crate::error::CliError;

pub async fn run_auth(command: AuthCommands, config: &ClientConfig) -> Result<(), CliError> {
    match command {
        AuthCommands::Login { email, password } => {
            let client = auth_client(config)?.ok_or(marks_core::auth::AuthError::NotConfigured)?;
            let session = client.sign_in(&email, &password).await?;
            println!("Signed in as {}", session.user.label());
            Ok(())
        }
        AuthCommands::Status => {
            match current_session(config).await? {
                Some(session) => {
                    let email_label = session.user.email.as_deref().unwrap_or("(no email)");
                    println!(
                        "Signed in as {} <{}> (expires_at={})",
                        session.user.label(),
                        email_label,
                        session.expires_at
                    );
                }
                None => println!("Not signed in."),
            }
            Ok(())
        }
        AuthCommands::Logout => {
            let stored_session = load_stored_session()?;
            match (auth_client(config)?, stored_session) {
                (Some(client), Some(session)) => client.sign_out(&session.access_token).await?,
                _ => clear_stored_session()?,
            }
            println!("Signed out");
            Ok(())
        }
    }
}
