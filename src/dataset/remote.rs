use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tracing::info;

/// Download `url` into `cache_dir` unless a cached copy already exists.
pub fn fetch_cached(cache_dir: &Path, url: &str, file_name: Option<&str>) -> io::Result<PathBuf> {
    fs::create_dir_all(cache_dir)?;
    let name = match file_name {
        Some(name) => name.to_string(),
        None => file_name_from_url(url)?,
    };
    let path = cache_dir.join(name);

    if path.is_file() {
        info!("using cached download {}", path.display());
        return Ok(path);
    }

    download(url, &path)?;
    Ok(path)
}

fn download(url: &str, path: &Path) -> io::Result<()> {
    info!("downloading {url}");
    let response = ureq::get(url)
        .call()
        .map_err(|err| io::Error::other(err.to_string()))?;

    let mut reader = response.into_reader();
    let mut contents = Vec::new();
    reader.read_to_end(&mut contents)?;

    // Partial downloads never land at `path`.
    let partial = path.with_extension("partial");
    let mut file = File::create(&partial)?;
    file.write_all(&contents)?;
    file.flush()?;
    fs::rename(&partial, path)?;
    Ok(())
}

fn file_name_from_url(url: &str) -> io::Result<String> {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    trimmed
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot derive a file name from {url}; set `file_name`"),
            )
        })
}
