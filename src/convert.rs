use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;
use tracing::{info, warn};

use crate::config::ToolPrograms;
use crate::domain::ZoomRange;
use crate::error::ChartError;
use crate::fs_util;

const PALETTE_MARKER: &str = "ColorInterp=Palette";

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub gdalinfo: Option<String>,
    pub gdal_translate: Option<String>,
    pub gdal2tiles: Option<String>,
}

/// External raster tooling used to turn a GeoTIFF into a tile pyramid.
pub trait RasterTool: Send + Sync {
    fn is_paletted(&self, tiff: &Path) -> Result<bool, ChartError>;
    fn expand_to_rgba(&self, tiff: &Path, vrt: &Path) -> Result<(), ChartError>;
    fn build_tiles(
        &self,
        input: &Path,
        out_dir: &Path,
        zoom: ZoomRange,
    ) -> Result<(), ChartError>;
    fn tool_info(&self) -> ToolInfo;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionOutcome {
    pub source: PathBuf,
    pub tiles_dir: PathBuf,
    pub paletted: bool,
}

#[derive(Clone)]
pub struct GdalTools {
    gdalinfo: Option<PathBuf>,
    gdal_translate: Option<PathBuf>,
    gdal2tiles: Option<PathBuf>,
}

impl GdalTools {
    pub fn new(programs: &ToolPrograms) -> Self {
        Self {
            gdalinfo: locate(&programs.gdalinfo),
            gdal_translate: locate(&programs.gdal_translate),
            gdal2tiles: locate(&programs.gdal2tiles),
        }
    }

    fn require<'a>(tool: &'a Option<PathBuf>, name: &str) -> Result<&'a PathBuf, ChartError> {
        tool.as_ref()
            .ok_or_else(|| ChartError::MissingTool(name.to_string()))
    }

    fn run_cmd(&self, program: &Path, args: &[String]) -> Result<String, ChartError> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| ChartError::Conversion(format!("{}: {err}", program.display())))?;
        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).to_string());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("command failed: {} ({})", program.display(), output.status)
        } else {
            stderr
        };
        Err(ChartError::Conversion(message))
    }
}

impl RasterTool for GdalTools {
    fn is_paletted(&self, tiff: &Path) -> Result<bool, ChartError> {
        let gdalinfo = Self::require(&self.gdalinfo, "gdalinfo")?;
        let stdout = self.run_cmd(gdalinfo, &[path_arg(tiff)])?;
        Ok(stdout.contains(PALETTE_MARKER))
    }

    fn expand_to_rgba(&self, tiff: &Path, vrt: &Path) -> Result<(), ChartError> {
        let translate = Self::require(&self.gdal_translate, "gdal_translate")?;
        let args = vec![
            "-of".to_string(),
            "vrt".to_string(),
            "-expand".to_string(),
            "rgba".to_string(),
            path_arg(tiff),
            path_arg(vrt),
        ];
        self.run_cmd(translate, &args).map(|_| ())
    }

    fn build_tiles(
        &self,
        input: &Path,
        out_dir: &Path,
        zoom: ZoomRange,
    ) -> Result<(), ChartError> {
        let gdal2tiles = Self::require(&self.gdal2tiles, "gdal2tiles")?;
        let args = vec![
            "-z".to_string(),
            zoom.to_string(),
            "-w".to_string(),
            "none".to_string(),
            path_arg(input),
            path_arg(out_dir),
        ];
        self.run_cmd(gdal2tiles, &args).map(|_| ())
    }

    fn tool_info(&self) -> ToolInfo {
        ToolInfo {
            gdalinfo: self
                .gdalinfo
                .as_ref()
                .and_then(|path| tool_version(path, &["--version"])),
            gdal_translate: self
                .gdal_translate
                .as_ref()
                .and_then(|path| tool_version(path, &["--version"])),
            gdal2tiles: self.gdal2tiles.as_ref().map(|path| path.display().to_string()),
        }
    }
}

/// Tiles one GeoTIFF. Paletted input is expanded to an RGBA VRT first so the
/// tiler does not resample palette indices.
pub fn convert_tiff(
    tool: &dyn RasterTool,
    tiff: &Path,
    zoom: ZoomRange,
) -> Result<ConversionOutcome, ChartError> {
    let tiles_dir = fs_util::tiles_dir_for(tiff);
    let paletted = match tool.is_paletted(tiff) {
        Ok(paletted) => paletted,
        Err(err) => {
            warn!(tiff = %tiff.display(), error = %err, "palette check failed, tiling as-is");
            false
        }
    };

    let input = if paletted {
        let vrt = PathBuf::from(format!("{}.vrt", tiff.display()));
        info!(vrt = %vrt.display(), "expanding paletted raster to RGBA");
        tool.expand_to_rgba(tiff, &vrt)?;
        vrt
    } else {
        tiff.to_path_buf()
    };

    tool.build_tiles(&input, &tiles_dir, zoom)?;
    Ok(ConversionOutcome {
        source: tiff.to_path_buf(),
        tiles_dir,
        paletted,
    })
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Resolves a program name against `PATH`; names containing a path separator
/// are taken as-is.
fn locate(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.exists().then(|| candidate.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let exe = dir.join(format!("{program}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = dir.join(program);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}

fn tool_version(path: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new(path).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() { None } else { Some(stdout) }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;

    use super::*;

    #[derive(Default)]
    struct RecordingTool {
        paletted: bool,
        fail_probe: bool,
        calls: Mutex<Vec<String>>,
    }

    impl RasterTool for RecordingTool {
        fn is_paletted(&self, _tiff: &Path) -> Result<bool, ChartError> {
            if self.fail_probe {
                return Err(ChartError::MissingTool("gdalinfo".to_string()));
            }
            Ok(self.paletted)
        }

        fn expand_to_rgba(&self, _tiff: &Path, vrt: &Path) -> Result<(), ChartError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("expand {}", vrt.display()));
            Ok(())
        }

        fn build_tiles(
            &self,
            input: &Path,
            _out_dir: &Path,
            zoom: ZoomRange,
        ) -> Result<(), ChartError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("tile {} {zoom}", input.display()));
            Ok(())
        }

        fn tool_info(&self) -> ToolInfo {
            ToolInfo {
                gdalinfo: None,
                gdal_translate: None,
                gdal2tiles: None,
            }
        }
    }

    #[test]
    fn paletted_input_goes_through_vrt() {
        let tool = RecordingTool {
            paletted: true,
            ..Default::default()
        };
        let outcome = convert_tiff(&tool, Path::new("/d/SEA.tif"), ZoomRange::default()).unwrap();
        assert!(outcome.paletted);
        assert_eq!(outcome.tiles_dir, PathBuf::from("/d/SEA_tiles"));
        let calls = tool.calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec!["expand /d/SEA.tif.vrt".to_string(), "tile /d/SEA.tif.vrt 5-12".to_string()]
        );
    }

    #[test]
    fn failed_probe_tiles_original() {
        let tool = RecordingTool {
            fail_probe: true,
            ..Default::default()
        };
        let outcome = convert_tiff(&tool, Path::new("/d/ELUS1.tif"), ZoomRange::default()).unwrap();
        assert!(!outcome.paletted);
        assert_eq!(
            *tool.calls.lock().unwrap(),
            vec!["tile /d/ELUS1.tif 5-12".to_string()]
        );
    }

    #[test]
    fn missing_tool_is_reported() {
        let tools = GdalTools {
            gdalinfo: None,
            gdal_translate: None,
            gdal2tiles: None,
        };
        let err = tools
            .build_tiles(Path::new("a.tif"), Path::new("a_tiles"), ZoomRange::default())
            .unwrap_err();
        assert_matches!(err, ChartError::MissingTool(_));
    }
}
