use anyhow::{anyhow, Result};
use pubnub::Client;

pub async fn time(client: &Client) -> Result<()> {
    let envelopes = client.time()?.execute().await?;

    let timetoken = envelopes
        .first()
        .and_then(|envelope| envelope.timetoken())
        .ok_or_else(|| anyhow!("Server did not return a time"))?;

    println!("{}", timetoken);

    Ok(())
}
