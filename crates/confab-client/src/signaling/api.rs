use reqwest::{Client, RequestBuilder, Response};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::SignalingError;

fn authorize(request: RequestBuilder, token: &str) -> RequestBuilder {
    request.header("Authorization", format!("Bearer {}", token))
}

async fn check(response: Response) -> Result<Response, SignalingError> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(SignalingError::Status { status, body });
    }
    Ok(response)
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, SignalingError> {
    let text = response.text().await?;
    serde_json::from_str(&text).map_err(|e| SignalingError::Decode(e.to_string()))
}

pub async fn get<T: DeserializeOwned>(client: &Client, url: &str, token: &str) -> Result<T, SignalingError> {
    let response = authorize(client.get(url), token).send().await?;
    decode(check(response).await?).await
}

pub async fn post<T: DeserializeOwned, B: Serialize>(
    client: &Client,
    url: &str,
    body: &B,
    token: &str,
) -> Result<T, SignalingError> {
    let response = authorize(client.post(url).json(body), token).send().await?;
    decode(check(response).await?).await
}

/// PUT whose response body is ignored
pub async fn put_discard<B: Serialize>(
    client: &Client,
    url: &str,
    body: &B,
    token: &str,
) -> Result<(), SignalingError> {
    let response = authorize(client.put(url).json(body), token).send().await?;
    check(response).await?;
    Ok(())
}
