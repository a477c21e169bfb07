// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The fixed inputs every job shares: header/footer template and two fonts.

use std::path::Path;

use paginator_core::config::AssetPaths;
use paginator_core::error::{PaginatorError, Result};
use paginator_core::types::AssetRole;
use tracing::{info, instrument};

/// Raw bytes of the template image and the two fonts.
///
/// The pipeline never touches the filesystem for these; callers load them
/// once and hand the blobs over.
#[derive(Debug, Clone)]
pub struct AssetBundle {
    pub template: Vec<u8>,
    pub title_font: Vec<u8>,
    pub page_number_font: Vec<u8>,
}

impl AssetBundle {
    pub fn from_bytes(template: Vec<u8>, title_font: Vec<u8>, page_number_font: Vec<u8>) -> Self {
        Self {
            template,
            title_font,
            page_number_font,
        }
    }

    /// Load all three assets, resolving relative paths against `base_dir`.
    ///
    /// The template is checked first, so a missing template is always the
    /// error reported when several assets are absent.
    #[instrument(skip_all, fields(base = %base_dir.as_ref().display()))]
    pub fn load(paths: &AssetPaths, base_dir: impl AsRef<Path>) -> Result<Self> {
        let base = base_dir.as_ref();
        let template = read_asset(AssetRole::Template, &base.join(&paths.template))?;
        let title_font = read_asset(AssetRole::TitleFont, &base.join(&paths.title_font))?;
        let page_number_font =
            read_asset(AssetRole::PageNumberFont, &base.join(&paths.page_number_font))?;

        info!(
            template_bytes = template.len(),
            title_font_bytes = title_font.len(),
            page_number_font_bytes = page_number_font.len(),
            "Assets loaded"
        );

        Ok(Self {
            template,
            title_font,
            page_number_font,
        })
    }
}

fn read_asset(role: AssetRole, path: &Path) -> Result<Vec<u8>> {
    if !path.is_file() {
        return Err(PaginatorError::MissingAsset {
            role,
            path: path.to_path_buf(),
        });
    }
    Ok(std::fs::read(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_assets(dir: &Path, paths: &AssetPaths, skip: Option<AssetRole>) {
        std::fs::create_dir_all(dir.join("fonts")).expect("fonts dir");
        for (role, path) in [
            (AssetRole::Template, &paths.template),
            (AssetRole::TitleFont, &paths.title_font),
            (AssetRole::PageNumberFont, &paths.page_number_font),
        ] {
            if Some(role) != skip {
                std::fs::write(dir.join(path), b"asset").expect("write asset");
            }
        }
    }

    #[test]
    fn loads_all_three_assets() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AssetPaths::default();
        write_assets(dir.path(), &paths, None);

        let bundle = AssetBundle::load(&paths, dir.path()).expect("load");
        assert_eq!(bundle.template, b"asset");
        assert_eq!(bundle.page_number_font, b"asset");
    }

    #[test]
    fn missing_template_is_reported_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AssetPaths::default();

        let err = AssetBundle::load(&paths, dir.path()).expect_err("nothing on disk");
        match err {
            PaginatorError::MissingAsset { role, path } => {
                assert_eq!(role, AssetRole::Template);
                assert!(path.ends_with("Header and Footer Template.png"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_font_names_its_role() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AssetPaths::default();
        write_assets(dir.path(), &paths, Some(AssetRole::PageNumberFont));

        let err = AssetBundle::load(&paths, dir.path()).expect_err("font absent");
        assert!(matches!(
            err,
            PaginatorError::MissingAsset {
                role: AssetRole::PageNumberFont,
                ..
            }
        ));
    }
}
