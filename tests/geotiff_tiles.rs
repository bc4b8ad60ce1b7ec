//! Tiles and picks served from a GeoTIFF pyramid on disk.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cog_imagery::{BandDomain, GeoTiffDecoder, ProviderOptions, TileImageryProvider};
use tempfile::TempDir;
use tiff::encoder::TiffEncoder;
use tiff::encoder::colortype::Gray32Float;
use tiff::tags::Tag;

const NODATA: f32 = -9999.0;

/// 8x8 ramp (row * 8 + col) over lon 10..18, lat 42..50 with a 4x4 overview.
/// Pixel (1, 1) of the full level is no-data.
fn write_pyramid(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("ramp.tif");
    let mut file = File::create(&path).unwrap();
    let mut encoder = TiffEncoder::new(&mut file).unwrap();

    let mut full: Vec<f32> = (0..64).map(|v| v as f32).collect();
    full[9] = NODATA;
    let overview: Vec<f32> = (0..16).map(|i| ((i / 4) * 16 + (i % 4) * 2) as f32).collect();
    let levels: [(u32, f64, &[f32]); 2] = [(8, 1.0, &full), (4, 2.0, &overview)];

    for (size, scale, data) in levels {
        let mut image = encoder.new_image::<Gray32Float>(size, size).unwrap();
        image.encoder().write_tag(Tag::Unknown(33550), &[scale, scale, 0.0][..]).unwrap();
        image
            .encoder()
            .write_tag(Tag::Unknown(33922), &[0.0, 0.0, 0.0, 10.0, 50.0, 0.0][..])
            .unwrap();
        image
            .encoder()
            .write_tag(Tag::Unknown(34735), &[1u16, 1, 0, 1, 2048, 0, 1, 4326][..])
            .unwrap();
        image.encoder().write_tag(Tag::Unknown(42113), "-9999").unwrap();
        image
            .encoder()
            .write_tag(
                Tag::Unknown(42112),
                r#"<GDALMetadata><Item name="STATISTICS_MINIMUM" sample="0">0</Item><Item name="STATISTICS_MAXIMUM" sample="0">63</Item></GDALMetadata>"#,
            )
            .unwrap();
        image.write_data(data).unwrap();
    }
    path
}

fn byte_of(value: f64) -> u8 {
    (value / 63.0 * 255.0).round() as u8
}

async fn open(path: &Path) -> TileImageryProvider {
    let decoder = Arc::new(GeoTiffDecoder::open(path).unwrap());
    let options = ProviderOptions::from_json(r#"{"tile_size": 4, "pool_size": 2}"#).unwrap();
    TileImageryProvider::builder(decoder).options(options).open().await.unwrap()
}

#[tokio::test]
async fn test_geotiff_tiles_follow_pyramid() {
    let dir = TempDir::new().unwrap();
    let path = write_pyramid(&dir);
    let provider = open(&path).await;

    assert_eq!(provider.source().levels.len(), 2);
    assert_eq!(provider.level_resolver().request_levels(), &[1, 0]);
    // embedded statistics, no scan
    assert_eq!(provider.band_domain(0), Some(BandDomain::new(0.0, 63.0)));

    let overview = provider.request_image(0, 0, 0).await.unwrap().unwrap();
    assert_eq!(overview.pixel(0, 0).unwrap()[0], 0);
    assert_eq!(overview.pixel(3, 3).unwrap()[0], byte_of(54.0));

    let north_west = provider.request_image(0, 0, 1).await.unwrap().unwrap();
    assert_eq!(north_west.pixel(0, 0), Some([0, 0, 0, 255]));
    assert_eq!(north_west.pixel(1, 1).unwrap()[3], 0);
    assert_eq!(north_west.pixel(3, 3).unwrap()[0], byte_of(27.0));

    let south_east = provider.request_image(1, 1, 1).await.unwrap().unwrap();
    assert_eq!(south_east.pixel(3, 3), Some([255, 255, 255, 255]));
}

#[tokio::test]
async fn test_geotiff_pick_uses_resolved_level() {
    let dir = TempDir::new().unwrap();
    let path = write_pyramid(&dir);
    let provider = open(&path).await;

    let fine = provider.pick_value(1, 1, 1, 17.5, 42.5).await.unwrap().unwrap();
    assert_eq!((fine.level, fine.pixel), (0, (7, 7)));
    assert_eq!(fine.get(1), Some(63.0));

    let coarse = provider.pick_value(0, 0, 0, 17.5, 42.5).await.unwrap().unwrap();
    assert_eq!((coarse.level, coarse.pixel), (1, (3, 3)));
    assert_eq!(coarse.get(1), Some(54.0));

    let hole = provider.pick_value(0, 0, 1, 11.5, 48.5).await.unwrap().unwrap();
    assert_eq!(hole.pixel, (1, 1));
    assert!(hole.get(1).unwrap().is_nan());

    assert!(provider.pick_value(0, 0, 1, 20.0, 45.0).await.unwrap().is_none());
}
