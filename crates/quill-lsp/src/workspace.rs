// Quill - Narrative Script Language Server
//
// Copyright (c) 2025 Dweve IP B.V. and individual contributors.
//
// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository or at: http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Workspace file index.
//!
//! Knows which script and asset files exist on disk. The index is filled by
//! a directory scan when the workspace opens and kept current through the
//! client's watched-file events. The reference search uses it to link asset
//! ids (`font.Roboto`) to files, and the scheduler uses it to find main
//! scripts that are not open in the editor.

use crate::constants::{
    AUDIO_EXTENSIONS, FONT_EXTENSIONS, FONT_VARIANT_SUFFIXES, IMAGE_EXTENSIONS, VIDEO_EXTENSIONS,
};
use parking_lot::RwLock;
use quill_core::parse_asset_id;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tower_lsp::lsp_types::Url;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Asset category, named like the asset id prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKind {
    Image,
    Audio,
    Video,
    Font,
}

impl AssetKind {
    /// Category of a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        let ext = ext.as_str();
        if IMAGE_EXTENSIONS.contains(&ext) {
            Some(Self::Image)
        } else if AUDIO_EXTENSIONS.contains(&ext) {
            Some(Self::Audio)
        } else if VIDEO_EXTENSIONS.contains(&ext) {
            Some(Self::Video)
        } else if FONT_EXTENSIONS.contains(&ext) {
            Some(Self::Font)
        } else {
            None
        }
    }

    /// Category named by an asset id prefix.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "image" => Some(Self::Image),
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            "font" => Some(Self::Font),
            _ => None,
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Font => "font",
        }
    }
}

/// Script and asset files known on disk.
pub struct WorkspaceIndex {
    script_extensions: Vec<String>,
    scripts: RwLock<BTreeSet<Url>>,
    assets: RwLock<BTreeMap<Url, AssetKind>>,
}

impl WorkspaceIndex {
    pub fn new(script_extensions: Vec<String>) -> Self {
        Self {
            script_extensions,
            scripts: RwLock::new(BTreeSet::new()),
            assets: RwLock::new(BTreeMap::new()),
        }
    }

    fn extension_of(url: &Url) -> Option<String> {
        let path = url.path();
        let name = path.rsplit('/').next()?;
        let (_, ext) = name.rsplit_once('.')?;
        Some(ext.to_string())
    }

    /// Index every file under `root`. Returns the number of files indexed.
    pub fn scan(&self, root: &Path) -> usize {
        let mut indexed = 0;
        for entry in WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let Ok(url) = Url::from_file_path(entry.path()) else {
                continue;
            };
            if self.add_file(&url) {
                indexed += 1;
            }
        }
        info!("Indexed {} workspace files under {}", indexed, root.display());
        indexed
    }

    /// Record a created file. Returns `true` if it is a script or an asset.
    pub fn add_file(&self, url: &Url) -> bool {
        let Some(ext) = Self::extension_of(url) else {
            return false;
        };
        if self.script_extensions.iter().any(|s| *s == ext) {
            self.scripts.write().insert(url.clone());
            return true;
        }
        if let Some(kind) = AssetKind::from_extension(&ext) {
            self.assets.write().insert(url.clone(), kind);
            return true;
        }
        false
    }

    /// Forget a deleted file. Returns `true` if it was a script.
    pub fn remove_file(&self, url: &Url) -> bool {
        self.assets.write().remove(url);
        let was_script = self.scripts.write().remove(url);
        if was_script {
            debug!("Script removed from workspace index: {}", url);
        }
        was_script
    }

    pub fn contains_script(&self, url: &Url) -> bool {
        self.scripts.read().contains(url)
    }

    pub fn scripts(&self) -> Vec<Url> {
        self.scripts.read().iter().cloned().collect()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.read().len()
    }

    /// Files backing an asset id, sorted.
    ///
    /// The file stem must equal the asset name; for fonts the style variants
    /// (`name__bold`, `name__italic`, `name__bolditalic`) match too.
    pub fn find_assets(&self, asset_id: &str) -> Vec<Url> {
        let Some((prefix, name)) = parse_asset_id(asset_id) else {
            return Vec::new();
        };
        let Some(kind) = AssetKind::from_prefix(prefix) else {
            return Vec::new();
        };
        let mut stems = vec![name.to_string()];
        if kind == AssetKind::Font {
            stems.extend(FONT_VARIANT_SUFFIXES.iter().map(|s| format!("{}{}", name, s)));
        }

        self.assets
            .read()
            .iter()
            .filter(|(_, k)| **k == kind)
            .filter(|(url, _)| file_stem(url).is_some_and(|stem| stems.iter().any(|s| *s == stem)))
            .map(|(url, _)| url.clone())
            .collect()
    }
}

/// File name of `url` without its extension.
pub fn file_stem(url: &Url) -> Option<String> {
    let path = url.to_file_path().ok()?;
    path.file_stem()?.to_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn index() -> WorkspaceIndex {
        WorkspaceIndex::new(vec!["ink".to_string()])
    }

    #[test]
    fn test_asset_kind() {
        assert_eq!(AssetKind::from_extension("PNG"), Some(AssetKind::Image));
        assert_eq!(AssetKind::from_extension("ogg"), Some(AssetKind::Audio));
        assert_eq!(AssetKind::from_extension("woff2"), Some(AssetKind::Font));
        assert_eq!(AssetKind::from_extension("ink"), None);
        assert_eq!(AssetKind::from_prefix("video"), Some(AssetKind::Video));
        assert_eq!(AssetKind::Font.prefix(), "font");
    }

    #[test]
    fn test_scan_and_find_font_variants() {
        let dir = TempDir::new().unwrap();
        let fonts = dir.path().join("fonts");
        fs::create_dir_all(&fonts).unwrap();
        for name in [
            "Roboto.ttf",
            "Roboto__bold.ttf",
            "Roboto__bolditalic.ttf",
            "RobotoMono.ttf",
        ] {
            fs::write(fonts.join(name), b"").unwrap();
        }
        fs::write(dir.path().join("main.ink"), "-> END").unwrap();
        fs::write(dir.path().join("notes.txt"), "").unwrap();

        let index = index();
        assert_eq!(index.scan(dir.path()), 5);
        assert_eq!(index.scripts().len(), 1);
        assert_eq!(index.asset_count(), 4);

        let stems: Vec<_> = index
            .find_assets("font.Roboto")
            .iter()
            .filter_map(file_stem)
            .collect();
        assert_eq!(stems, vec!["Roboto", "Roboto__bold", "Roboto__bolditalic"]);
        assert!(index.find_assets("image.Roboto").is_empty());
        assert!(index.find_assets("Roboto").is_empty());
    }

    #[test]
    fn test_watched_file_events() {
        let index = index();
        let script = Url::parse("file:///story/forest.ink").unwrap();
        let image = Url::parse("file:///story/forest.png").unwrap();
        assert!(index.add_file(&script));
        assert!(index.add_file(&image));
        assert!(!index.add_file(&Url::parse("file:///story/README").unwrap()));
        assert!(index.contains_script(&script));
        assert_eq!(index.find_assets("image.forest"), vec![image.clone()]);

        assert!(index.remove_file(&script));
        assert!(!index.remove_file(&image));
        assert!(!index.contains_script(&script));
        assert!(index.find_assets("image.forest").is_empty());
    }

    #[test]
    fn test_file_stem_decodes() {
        let url = Url::parse("file:///a/My%20Font.ttf").unwrap();
        assert_eq!(file_stem(&url).as_deref(), Some("My Font"));
    }
}
