//! Sign command

use anyhow::{Result, bail};
use skylift_core::Engine;
use skylift_core::auth::Caller;
use skylift_core::signing::SignState;
use skylift_schema::ArtifactId;

use super::short_date;

/// Re-sign an artifact with a certificate and wait for the result.
pub async fn sign(engine: &Engine, caller: &Caller, id: ArtifactId, cert: i64) -> Result<()> {
    let job = engine.pipeline.submit(id, cert, caller).await?;
    println!("  Sign job {job} queued for artifact {id}.");

    match engine.pipeline.wait(job).await? {
        SignState::Signed => {
            let artifact = engine.registry.get(id).await?;
            let signed = artifact
                .signed_at
                .map_or_else(|| "-".to_string(), short_date);
            println!("  Signed at {signed}. Published links are unchanged.");
            Ok(())
        }
        SignState::Failed(reason) => bail!("signing failed: {reason}"),
        state => bail!("sign job ended in unexpected state {state:?}"),
    }
}
