//! GeoTIFF decoder backed by the `tiff` crate.
//!
//! Every full-resolution or overview IFD becomes one pyramid level; mask
//! IFDs are skipped. Windows are assembled from decoded chunks (tiles or
//! strips), which are kept in a small LRU cache per decoder. Each level keeps
//! one open reader positioned at its IFD.

use std::fs::File;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use lru::LruCache;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tracing::debug;

use crate::error::AnyResult;
use crate::geometry::BoundingBox;
use crate::raster::{PyramidLevel, RasterDecoder, RasterSource, SampleType};
use crate::stats::BandDomain;
use crate::window::PixelWindow;

const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GDAL_METADATA: u16 = 42112;
const TAG_GDAL_NODATA: u16 = 42113;

// GeoKey constants
const GEO_KEY_GEOGRAPHIC_TYPE: u32 = 2048;
const GEO_KEY_PROJECTED_CRS: u32 = 3072;

/// NewSubfileType bit marking a transparency mask.
const SUBFILE_MASK: u32 = 4;

const CHUNK_CACHE_CAPACITY: usize = 64;

/// Chunk grid of one IFD.
#[derive(Debug, Clone, Copy)]
struct ChunkLayout {
    ifd: usize,
    chunk_width: usize,
    chunk_height: usize,
    chunks_across: usize,
    chunks_down: usize,
}

pub struct GeoTiffDecoder {
    path: PathBuf,
    source: RasterSource,
    layouts: Vec<ChunkLayout>,
    readers: Vec<Mutex<Option<Decoder<File>>>>,
    chunks: Mutex<LruCache<(usize, usize), Arc<Vec<f32>>>>,
}

fn open_decoder(path: &Path) -> AnyResult<Decoder<File>> {
    Ok(Decoder::new(File::open(path)?)?.with_limits(Limits::unlimited()))
}

fn first_u32(decoder: &mut Decoder<File>, tag: Tag) -> Option<u32> {
    decoder.get_tag_u32_vec(tag).ok().and_then(|v| v.first().copied())
}

/// EPSG code from a GeoKey directory, preferring the projected CRS key.
#[must_use]
pub fn epsg_from_geokeys(keys: &[u32]) -> Option<u32> {
    // header: version, revision, minor revision, key count
    let count = *keys.get(3)? as usize;
    let entries: Vec<&[u32]> = keys[4..].chunks_exact(4).take(count).collect();
    let lookup = |key: u32| {
        entries
            .iter()
            .find(|e| e[0] == key && e[1] == 0 && e[3] > 0)
            .map(|e| e[3])
    };
    lookup(GEO_KEY_PROJECTED_CRS).or_else(|| lookup(GEO_KEY_GEOGRAPHIC_TYPE))
}

/// Per-band `STATISTICS_MINIMUM`/`STATISTICS_MAXIMUM` items of a GDAL
/// metadata document. Items without a `sample` attribute belong to band 0.
#[must_use]
pub fn parse_band_statistics(metadata: &str, bands: usize) -> Vec<Option<BandDomain>> {
    let mut mins = vec![None; bands];
    let mut maxs = vec![None; bands];
    for item in metadata.split("<Item").skip(1) {
        let Some(close) = item.find('>') else { continue };
        let (attrs, rest) = item.split_at(close);
        let Some(name) = attribute(attrs, "name") else { continue };
        let band = attribute(attrs, "sample").and_then(|s| s.parse::<usize>().ok()).unwrap_or(0);
        let value = rest[1..].split('<').next().and_then(|v| v.trim().parse::<f64>().ok());
        let slot = match name {
            "STATISTICS_MINIMUM" => &mut mins,
            "STATISTICS_MAXIMUM" => &mut maxs,
            _ => continue,
        };
        if let (Some(cell), Some(value)) = (slot.get_mut(band), value) {
            *cell = Some(value);
        }
    }
    mins.into_iter()
        .zip(maxs)
        .map(|(min, max)| Some(BandDomain::new(min?, max?)))
        .collect()
}

fn attribute<'a>(attrs: &'a str, key: &str) -> Option<&'a str> {
    let needle = format!("{key}=\"");
    let start = attrs.find(&needle)? + needle.len();
    let end = attrs[start..].find('"')?;
    Some(&attrs[start..start + end])
}

fn parse_nodata(text: &str) -> Option<f64> {
    text.trim_end_matches('\0').trim().parse().ok()
}

/// Native extent and row order from ModelPixelScale and ModelTiepoint.
fn georeference(scale: &[f64], tiepoint: &[f64], width: usize, height: usize) -> Option<(BoundingBox, bool)> {
    if scale.len() < 2 || tiepoint.len() < 6 {
        return None;
    }
    let (sx, sy) = (scale[0], scale[1]);
    let minx = tiepoint[3] - tiepoint[0] * sx;
    let y0 = tiepoint[4] + tiepoint[1] * sy;
    let y_end = y0 - height as f64 * sy;
    let bbox = BoundingBox::new(minx, y0.min(y_end), minx + width as f64 * sx, y0.max(y_end));
    // a negative Y scale puts row 0 on the southern edge
    Some((bbox, sy < 0.0))
}

fn convert_decoding_result(result: DecodingResult) -> Vec<f32> {
    match result {
        DecodingResult::U8(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::U16(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::U32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I8(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::I16(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::I32(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::F16(data) => data.into_iter().map(f32::from).collect(),
        DecodingResult::U64(data) => data.into_iter().map(|v| v as f32).collect(),
        DecodingResult::I64(data) => data.into_iter().map(|v| v as f32).collect(),
    }
}

impl GeoTiffDecoder {
    /// Read metadata of every IFD in `path`. No pixel data is decoded.
    pub fn open(path: impl AsRef<Path>) -> AnyResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut decoder = open_decoder(&path)?;

        let samples_per_pixel = decoder.get_tag_u32(Tag::SamplesPerPixel).unwrap_or(1) as usize;
        let bits = first_u32(&mut decoder, Tag::BitsPerSample).unwrap_or(8) as u16;
        let format = first_u32(&mut decoder, Tag::SampleFormat).unwrap_or(1) as u16;
        let sample_type = SampleType::from_tags(bits, format)
            .ok_or_else(|| format!("unsupported sample layout: {bits} bits, format {format}"))?;
        if decoder.get_tag_u32(Tag::PlanarConfiguration).unwrap_or(1) != 1 {
            return Err("planar-separate GeoTIFFs are not supported".into());
        }

        let (width, height) = decoder.dimensions()?;
        let scale = decoder
            .get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_MODEL_PIXEL_SCALE))
            .unwrap_or_default();
        let tiepoint = decoder
            .get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_MODEL_TIEPOINT))
            .unwrap_or_default();
        let (bbox, row_reversed) = georeference(&scale, &tiepoint, width as usize, height as usize)
            .ok_or("missing ModelPixelScale/ModelTiepoint tags")?;
        let epsg = decoder
            .get_tag_u32_vec(Tag::from_u16_exhaustive(TAG_GEO_KEY_DIRECTORY))
            .ok()
            .and_then(|keys| epsg_from_geokeys(&keys));
        let nodata = decoder
            .get_tag_ascii_string(Tag::from_u16_exhaustive(TAG_GDAL_NODATA))
            .ok()
            .and_then(|s| parse_nodata(&s));
        let band_stats = decoder
            .get_tag_ascii_string(Tag::from_u16_exhaustive(TAG_GDAL_METADATA))
            .map(|m| parse_band_statistics(&m, samples_per_pixel))
            .unwrap_or_else(|_| vec![None; samples_per_pixel]);

        let mut levels = Vec::new();
        let mut layouts = Vec::new();
        let mut ifd = 0;
        loop {
            let subfile = decoder.get_tag_u32(Tag::NewSubfileType).unwrap_or(0);
            if subfile & SUBFILE_MASK == 0 {
                let (w, h) = decoder.dimensions()?;
                let (cw, ch) = decoder.chunk_dimensions();
                let (w, h) = (w as usize, h as usize);
                let (cw, ch) = (cw.max(1) as usize, ch.max(1) as usize);
                levels.push(PyramidLevel {
                    index: levels.len(),
                    width: w,
                    height: h,
                    block_width: cw,
                    block_height: ch,
                    tiled: decoder.get_tag_u32(Tag::TileWidth).is_ok(),
                });
                layouts.push(ChunkLayout {
                    ifd,
                    chunk_width: cw,
                    chunk_height: ch,
                    chunks_across: w.div_ceil(cw),
                    chunks_down: h.div_ceil(ch),
                });
            }
            if !decoder.more_images() {
                break;
            }
            decoder.next_image()?;
            ifd += 1;
        }
        // overviews come in file order, which is not guaranteed to be finest first
        let mut order: Vec<usize> = (0..levels.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(levels[i].width * levels[i].height));
        let layouts: Vec<ChunkLayout> = order.iter().map(|&i| layouts[i]).collect();
        let levels: Vec<PyramidLevel> = order
            .iter()
            .enumerate()
            .map(|(index, &i)| PyramidLevel { index, ..levels[i] })
            .collect();

        debug!(
            path = %path.display(),
            levels = levels.len(),
            samples = samples_per_pixel,
            epsg = ?epsg,
            "opened GeoTIFF"
        );

        let capacity = NonZeroUsize::new(CHUNK_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            path,
            source: RasterSource {
                bbox,
                epsg,
                levels,
                samples_per_pixel,
                sample_type,
                nodata,
                row_reversed,
                band_stats,
            },
            readers: layouts.iter().map(|_| Mutex::new(None)).collect(),
            layouts,
            chunks: Mutex::new(LruCache::new(capacity)),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decode one chunk with the level's reader, opening it on first use.
    fn decode_chunk(&self, level: usize, layout: &ChunkLayout, chunk_index: usize) -> AnyResult<((u32, u32), Vec<f32>)> {
        let slot = self
            .readers
            .get(level)
            .ok_or_else(|| format!("level {level} does not exist"))?;
        let mut reader = slot.lock().unwrap_or_else(|e| e.into_inner());
        if reader.is_none() {
            let mut decoder = open_decoder(&self.path)?;
            decoder.seek_to_image(layout.ifd)?;
            debug!(path = %self.path.display(), level, ifd = layout.ifd, "opened level reader");
            *reader = Some(decoder);
        }
        let Some(decoder) = reader.as_mut() else {
            return Err(format!("no reader for level {level}").into());
        };
        let dims = decoder.chunk_data_dimensions(chunk_index as u32);
        match decoder.read_chunk(chunk_index as u32) {
            Ok(result) => Ok((dims, convert_decoding_result(result))),
            Err(err) => {
                // reopen on the next read
                *reader = None;
                Err(err.into())
            }
        }
    }

    fn load_chunk(&self, level: usize, layout: &ChunkLayout, chunk_index: usize) -> AnyResult<Vec<f32>> {
        let ((actual_width, actual_height), values) = self.decode_chunk(level, layout, chunk_index)?;
        let (actual_width, actual_height) = (actual_width as usize, actual_height as usize);
        let spp = self.source.samples_per_pixel;

        let expected_len = actual_width * actual_height * spp;
        if values.len() < expected_len {
            return Err(format!("decoded chunk has length {} (expected {expected_len})", values.len()).into());
        }

        // pad edge chunks to the full chunk size
        let mut padded = vec![f32::NAN; layout.chunk_width * layout.chunk_height * spp];
        for row in 0..actual_height {
            let src = row * actual_width * spp;
            let dst = row * layout.chunk_width * spp;
            padded[dst..dst + actual_width * spp].copy_from_slice(&values[src..src + actual_width * spp]);
        }
        Ok(padded)
    }

    fn fetch_chunk(&self, level: usize, layout: &ChunkLayout, chunk_index: usize) -> AnyResult<Arc<Vec<f32>>> {
        let key = (level, chunk_index);
        if let Some(chunk) = self.chunks.lock().unwrap_or_else(|e| e.into_inner()).get(&key) {
            return Ok(Arc::clone(chunk));
        }
        let chunk = Arc::new(self.load_chunk(level, layout, chunk_index)?);
        self.chunks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(key, Arc::clone(&chunk));
        Ok(chunk)
    }
}

impl RasterDecoder for GeoTiffDecoder {
    fn source(&self) -> &RasterSource {
        &self.source
    }

    fn read_window(
        &self,
        level: usize,
        window: &PixelWindow,
        bands: &[usize],
        fill: f32,
    ) -> AnyResult<Vec<Vec<f32>>> {
        let (Some(info), Some(layout)) = (self.source.level(level), self.layouts.get(level)) else {
            return Err(format!("level {level} does not exist").into());
        };
        let spp = self.source.samples_per_pixel;
        if let Some(band) = bands.iter().find(|&&b| b >= spp) {
            return Err(format!("band {band} out of range ({spp} bands)").into());
        }

        let out_w = window.width();
        let out_h = window.height();
        let mut out = vec![vec![fill; out_w * out_h]; bands.len()];

        // clip to the image
        let x0 = window.x0.max(0) as usize;
        let y0 = window.y0.max(0) as usize;
        let x1 = window.x1.clamp(0, info.width as i64) as usize;
        let y1 = window.y1.clamp(0, info.height as i64) as usize;
        if x0 >= x1 || y0 >= y1 {
            return Ok(out);
        }

        let (cw, ch) = (layout.chunk_width, layout.chunk_height);
        for chunk_row in y0 / ch..=((y1 - 1) / ch).min(layout.chunks_down - 1) {
            for chunk_col in x0 / cw..=((x1 - 1) / cw).min(layout.chunks_across - 1) {
                let chunk = self.fetch_chunk(level, layout, chunk_row * layout.chunks_across + chunk_col)?;
                let (ox, oy) = (chunk_col * cw, chunk_row * ch);
                for y in y0.max(oy)..y1.min(oy + ch) {
                    let dst_row = (y as i64 - window.y0) as usize * out_w;
                    for x in x0.max(ox)..x1.min(ox + cw) {
                        let src = ((y - oy) * cw + (x - ox)) * spp;
                        let dst = dst_row + (x as i64 - window.x0) as usize;
                        for (plane, &band) in out.iter_mut().zip(bands) {
                            plane[dst] = chunk[src + band];
                        }
                    }
                }
            }
        }
        Ok(out)
    }
}
