//! Lecture des fichiers d'entrée : décompression bz2, détection d'encodage,
//! empreinte BLAKE3

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bzip2::read::BzDecoder;
use serde::Serialize;
use tracing::{debug, warn};

/// Fichier lu, avec son empreinte pour le rapport
#[derive(Debug, Clone, Serialize)]
pub struct InputFile {
    pub layer: String,
    pub path: PathBuf,
    /// Taille sur disque (octets)
    pub bytes: u64,
    /// BLAKE3 du contenu brut, en hexadécimal
    pub blake3: String,
    /// Encodage détecté du texte
    pub encoding: &'static str,
}

/// Texte décodé d'un fichier d'entrée
#[derive(Debug)]
pub struct DecodedText {
    pub text: String,
    pub file: InputFile,
}

/// Lit un fichier (éventuellement `.bz2`) et le décode en texte
///
/// UTF-8 validé par `simdutf8` ; à défaut, Windows-1252 (fichiers exportés
/// par des SIG en Latin-1).
pub fn read_text(layer: &str, path: &Path) -> Result<DecodedText> {
    let raw = std::fs::read(path)
        .with_context(|| format!("Failed to read {} file: {}", layer, path.display()))?;
    let fingerprint = hex::encode(blake3::hash(&raw).as_bytes());
    let bytes = raw.len() as u64;

    let content = if is_bz2(path) {
        let mut decoded = Vec::new();
        BzDecoder::new(File::open(path)?)
            .read_to_end(&mut decoded)
            .with_context(|| format!("Failed to decompress {}", path.display()))?;
        decoded
    } else {
        raw
    };

    let (text, encoding) = decode(&content);
    if encoding != "utf-8" {
        warn!(layer, path = %path.display(), encoding, "Input is not UTF-8, decoded as legacy encoding");
    }
    debug!(layer, path = %path.display(), bytes, blake3 = %fingerprint, "Input read");

    Ok(DecodedText {
        text,
        file: InputFile {
            layer: layer.to_string(),
            path: path.to_path_buf(),
            bytes,
            blake3: fingerprint,
            encoding,
        },
    })
}

fn is_bz2(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("bz2"))
}

/// Décode des octets en texte et renvoie le nom de l'encodage retenu
pub fn decode(bytes: &[u8]) -> (String, &'static str) {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match simdutf8::basic::from_utf8(bytes) {
        Ok(s) => (s.to_string(), "utf-8"),
        Err(_) => {
            let (decoded, encoding, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            (decoded.into_owned(), encoding.name())
        }
    }
}
