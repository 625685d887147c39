//! Icon fetching with an on-disk cache in the assets directory

use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use image::DynamicImage;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const MDI_BASE_URL: &str = "https://raw.githubusercontent.com/Templarian/MaterialDesign/master/svg";
const SPOTIFY_OEMBED_URL: &str = "https://embed.spotify.com/oembed/?url=";
const TIMEOUT: Duration = Duration::from_secs(5);

pub fn mdi_url(name: &str) -> String {
    format!("{}/{}.svg", MDI_BASE_URL, name)
}

/// Fetches the body behind a URL
pub type Fetch = dyn Fn(&str) -> Result<Vec<u8>> + Send + Sync;

/// Blocking HTTP GET with a timeout
pub fn download(url: &str) -> Result<Vec<u8>> {
    info!("Downloading {}", url);
    let agent = ureq::AgentBuilder::new().timeout(TIMEOUT).build();
    let response = agent
        .get(url)
        .call()
        .map_err(|e| anyhow!("Failed to fetch {}: {}", url, e))?;

    let mut data = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut data)
        .with_context(|| format!("Failed to read response from {}", url))?;
    debug!("Downloaded {} bytes", data.len());
    Ok(data)
}

/// Extension of the last path segment, like `.html`; empty when there is none
fn suffix(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    match name.rfind('.') {
        Some(i) if i > 0 && i + 1 < name.len() => &name[i..],
        _ => "",
    }
}

/// Disk cache name for a downloaded URL: `<domain with dots as underscores>-<hash><ext>`
pub fn url_to_filename(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("://")?;
    let domain_len = rest
        .find(|c: char| !(c.is_ascii_alphabetic() || c == '.'))
        .unwrap_or(rest.len());
    if domain_len == 0 {
        return None;
    }
    let domain = &rest[..domain_len];
    let path = &rest[domain_len..];
    let path = &path[path.find('/')?..];

    let hash = format!("{:x}", Sha256::digest(format!("{}{}", domain, path)));
    Some(format!("{}-{}{}", domain.replace('.', "_"), &hash[..8], suffix(path)))
}

/// `spotify:playlist/abc` becomes `spotify_playlist_abc.jpeg`
fn id_to_filename(id: &str, suffix: &str) -> String {
    format!("{}{}", id.replace(['/', ':'], "_"), suffix)
}

/// Path of the named vector icon, downloading it on first use
pub fn mdi_svg(assets: &Path, name: &str, fetch: &Fetch) -> Result<PathBuf> {
    let path = assets.join(format!("{}.svg", name));
    if path.exists() {
        return Ok(path);
    }

    let url = mdi_url(name);
    let content = fetch(&url)?;
    resvg::usvg::Tree::from_data(&content, &resvg::usvg::Options::default()).map_err(|e| {
        anyhow!(
            "Invalid SVG from {}: {} (starts with {:?})",
            url,
            e,
            String::from_utf8_lossy(&content[..content.len().min(100)])
        )
    })?;

    std::fs::create_dir_all(assets).context("Failed to create assets directory")?;
    std::fs::write(&path, &content)
        .with_context(|| format!("Failed to save {}", path.display()))?;
    Ok(path)
}

fn cached_or_download(path: &Path, url: &str, fetch: &Fetch) -> Result<DynamicImage> {
    if path.exists() {
        debug!("Loading cached image {}", path.display());
        return image::open(path).with_context(|| format!("Failed to open {}", path.display()));
    }

    let data = fetch(url)?;
    let img = image::load_from_memory(&data)
        .with_context(|| format!("Failed to decode image from {}", url))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create assets directory")?;
    }
    img.to_rgb8()
        .save(path)
        .with_context(|| format!("Failed to cache {}", path.display()))?;
    Ok(img)
}

/// Bitmap behind a plain URL, cached under its hashed file name
pub fn url_image(assets: &Path, url: &str, fetch: &Fetch) -> Result<DynamicImage> {
    let filename =
        url_to_filename(url).ok_or_else(|| anyhow!("Cannot derive a file name from {}", url))?;
    cached_or_download(&assets.join(filename), url, fetch)
}

/// Artwork for a Spotify id such as `playlist/37i9dQZF1DXaRycgyh6kXP`
pub fn spotify_image(assets: &Path, id: &str, fetch: &Fetch) -> Result<DynamicImage> {
    let path = assets.join(id_to_filename(&format!("spotify:{}", id), ".jpeg"));
    if path.exists() {
        return image::open(&path).with_context(|| format!("Failed to open {}", path.display()));
    }

    let open_url = format!("http://open.spotify.com/{}", id);
    let oembed = fetch(&format!(
        "{}{}",
        SPOTIFY_OEMBED_URL,
        urlencoding::encode(&open_url)
    ))?;
    let data: serde_json::Value =
        serde_json::from_slice(&oembed).context("Failed to parse Spotify oEmbed response")?;
    let thumbnail = data["thumbnail_url"]
        .as_str()
        .ok_or_else(|| anyhow!("Spotify oEmbed response for {} has no thumbnail_url", id))?;
    cached_or_download(&path, thumbnail, fetch)
}

/// Decode a `data:image/...;base64,<data>` URL
pub fn data_url_image(data_url: &str) -> Result<DynamicImage> {
    let (_, encoded) = data_url
        .split_once(',')
        .ok_or_else(|| anyhow!("Invalid data URL format"))?;
    let data = STANDARD
        .decode(encoded.trim())
        .map_err(|e| anyhow!("Failed to decode base64 image: {}", e))?;
    image::load_from_memory(&data).map_err(|e| anyhow!("Failed to parse image from base64: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_to_filename() {
        assert_eq!(
            url_to_filename("https://www.example.com/path/to/file.html").as_deref(),
            Some("www_example_com-1f8a388e.html")
        );
        assert!(url_to_filename("https://example.com/img")
            .unwrap()
            .starts_with("example_com-"));
        assert_eq!(url_to_filename("no-scheme/path"), None);
    }

    #[test]
    fn test_mdi_url() {
        assert_eq!(
            mdi_url("lightbulb"),
            "https://raw.githubusercontent.com/Templarian/MaterialDesign/master/svg/lightbulb.svg"
        );
    }

    #[test]
    fn test_id_to_filename() {
        assert_eq!(
            id_to_filename("spotify:playlist/37i9dQZF1DXaRycgyh6kXP", ".jpeg"),
            "spotify_playlist_37i9dQZF1DXaRycgyh6kXP.jpeg"
        );
    }

    #[test]
    fn test_data_url_image() {
        let mut png = Vec::new();
        image::RgbImage::from_pixel(2, 2, image::Rgb([1, 2, 3]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let url = format!("data:image/png;base64,{}", STANDARD.encode(&png));
        let img = data_url_image(&url).unwrap().to_rgb8();
        assert_eq!(img.get_pixel(1, 1), &image::Rgb([1, 2, 3]));
        assert!(data_url_image("data:image/png;base64").is_err());
    }

    #[test]
    fn test_cached_svg_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("offline.svg"), "<svg/>").unwrap();
        let offline = |url: &str| -> Result<Vec<u8>> { panic!("unexpected fetch of {}", url) };
        let path = mdi_svg(dir.path(), "offline", &offline).unwrap();
        assert_eq!(path, dir.path().join("offline.svg"));
    }

    #[test]
    fn test_fetched_image_is_kept_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut png = Vec::new();
        image::RgbImage::from_pixel(4, 4, image::Rgb([9, 8, 7]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let fetch = move |_: &str| -> Result<Vec<u8>> { Ok(png.clone()) };
        let url = "https://example.com/cover.png";
        let img = url_image(dir.path(), url, &fetch).unwrap().to_rgb8();
        assert_eq!(img.get_pixel(0, 0), &image::Rgb([9, 8, 7]));

        let offline = |_: &str| -> Result<Vec<u8>> { Err(anyhow!("offline")) };
        assert!(url_image(dir.path(), url, &offline).is_ok());
        assert!(url_image(dir.path(), "https://example.com/other.png", &offline).is_err());
    }
}
