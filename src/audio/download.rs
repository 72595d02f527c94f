use std::path::Path;

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{Doc2SpeechError, Result};

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "ogg", "m4a", "aac", "opus"];

/// File extension for a downloaded segment, taken from the URL path when it
/// names a known audio type.
pub fn audio_extension_for_url(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let ext = path
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_lowercase());

    ext.and_then(|e| AUDIO_EXTENSIONS.iter().find(|known| **known == e).copied())
        .unwrap_or("mp3")
}

/// Stream the audio at `url` into `output`.
pub async fn download_audio(client: &reqwest::Client, url: &str, output: &Path) -> Result<u64> {
    debug!("Downloading {} to {}", url, output.display());

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| Doc2SpeechError::Download(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Doc2SpeechError::Download(format!("{url}: HTTP {status}")));
    }

    let mut file = File::create(output).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let bytes = chunk.map_err(|e| Doc2SpeechError::Download(format!("{url}: {e}")))?;
        file.write_all(&bytes).await?;
        written += bytes.len() as u64;
    }
    file.flush().await?;

    if written == 0 {
        return Err(Doc2SpeechError::Download(format!("{url}: empty response body")));
    }

    debug!("Downloaded {} bytes", written);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_from_url() {
        assert_eq!(audio_extension_for_url("https://cdn.fal.media/x/out.wav"), "wav");
        assert_eq!(audio_extension_for_url("https://cdn/x/OUT.MP3?sig=abc"), "mp3");
        assert_eq!(audio_extension_for_url("https://cdn/x/file.flac#t=1"), "flac");
    }

    #[test]
    fn test_extension_defaults_to_mp3() {
        assert_eq!(audio_extension_for_url("https://cdn/x/blob"), "mp3");
        assert_eq!(audio_extension_for_url("https://cdn/x/page.html"), "mp3");
        assert_eq!(audio_extension_for_url("https://cdn.example.com/"), "mp3");
    }
}
