use std::collections::HashMap;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::json;

use feedkeeper::app::{App, CancelFlag, EntryOutcome};
use feedkeeper::config::{Config, ConfigLoader, ResolvedConfig};
use feedkeeper::domain::{ArchiveEntry, Locale};
use feedkeeper::error::FeedError;
use feedkeeper::feed::FeedClient;
use feedkeeper::layout::Layout;
use feedkeeper::tags::{ImageTags, SidecarTagWriter, TagWriter};

const HOST: &str = "https://www.bing.com";

#[derive(Default)]
struct MockFeed {
    pages: Vec<String>,
    images: HashMap<String, Vec<u8>>,
    fetches: Mutex<usize>,
    downloads: Mutex<Vec<String>>,
}

impl MockFeed {
    fn with_entries(entries: &[(&str, &str)]) -> Self {
        Self {
            pages: vec![page(entries)],
            ..Self::default()
        }
    }

    fn serve(mut self, url_base: &str, bytes: Vec<u8>) -> Self {
        self.images.insert(url(url_base), bytes);
        self
    }

    fn fetch_count(&self) -> usize {
        *self.fetches.lock().unwrap()
    }

    fn downloaded(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

impl FeedClient for MockFeed {
    fn fetch_page(
        &self,
        cursor: usize,
        count: usize,
        _locale: &Locale,
    ) -> Result<String, FeedError> {
        *self.fetches.lock().unwrap() += 1;
        Ok(self
            .pages
            .get(cursor / count)
            .cloned()
            .unwrap_or_else(|| page(&[])))
    }

    fn download_image(&self, url: &str, destination: &Path) -> Result<(), FeedError> {
        self.downloads.lock().unwrap().push(url.to_string());
        let bytes = self.images.get(url).ok_or_else(|| FeedError::ImageStatus {
            status: 404,
            message: "not found".to_string(),
        })?;
        fs::write(destination, bytes).map_err(|err| FeedError::Filesystem(err.to_string()))
    }
}

struct MockTags;

impl TagWriter for MockTags {
    fn write_tags(&self, _image: &Utf8Path, _tags: &ImageTags) -> Result<(), FeedError> {
        Ok(())
    }
}

struct FailingTags;

impl TagWriter for FailingTags {
    fn write_tags(&self, _image: &Utf8Path, _tags: &ImageTags) -> Result<(), FeedError> {
        Err(FeedError::Tags("read-only".to_string()))
    }
}

fn page(entries: &[(&str, &str)]) -> String {
    let images: Vec<_> = entries
        .iter()
        .map(|(date, url_base)| {
            json!({
                "startdate": date,
                "enddate": date,
                "urlbase": url_base,
                "copyright": "Lighthouse at dawn, Maine (© Jane Doe/Getty Images)",
                "headline": "Morning light",
            })
        })
        .collect();
    json!({ "images": images }).to_string()
}

fn url(url_base: &str) -> String {
    format!("{HOST}{url_base}_1920x1080.jpg")
}

fn gradient(vertical: bool) -> Vec<u8> {
    let image = RgbImage::from_fn(192, 108, |x, y| {
        let value = if vertical { y * 255 / 107 } else { x * 255 / 191 };
        Rgb([value as u8, value as u8, value as u8])
    });
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn setup() -> (tempfile::TempDir, Layout, ResolvedConfig) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let config = ConfigLoader::resolve_config(Config {
        locales: vec!["en-US".to_string()],
        ..Config::default()
    })
    .unwrap();
    (temp, Layout::new_with_root(root), config)
}

#[test]
fn new_image_is_saved_tagged_and_remembered() {
    let (_temp, layout, config) = setup();
    let base = "/th?id=OHR.Test_EN-US1234567890";
    let feed = MockFeed::with_entries(&[("20240501", base)]).serve(base, gradient(false));
    let tags = SidecarTagWriter::new(layout.tags_dir());

    let mut app = App::open(layout.clone(), &config, feed, tags).unwrap();
    app.reconcile().unwrap();
    let result = app.run(&config.locales, &CancelFlag::new()).unwrap();

    assert_eq!(result.downloaded, 1);
    assert_eq!(result.locales.len(), 1);
    assert_eq!(result.locales[0].entries, 1);
    assert!(layout.save_dir().join("Test.jpg").as_std_path().is_file());
    assert!(app.history().contains(&url(base)));
    assert!(app.fingerprints().is_known_file_name("Test.jpg"));
    app.finish().unwrap();

    let sidecar_path = layout.tags_dir().join("Test.jpg.json");
    let sidecar = fs::read_to_string(sidecar_path.as_std_path()).unwrap();
    let sidecar: serde_json::Value = serde_json::from_str(&sidecar).unwrap();
    assert_eq!(sidecar["title"], "Lighthouse at dawn, Maine");
    assert_eq!(sidecar["author"], "Jane Doe/Getty Images");
    assert_eq!(sidecar["comment"], "Morning light");
    assert!(
        fs::read_dir(layout.scratch_dir().as_std_path())
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    );

    let feed = MockFeed::with_entries(&[("20240501", base)]).serve(base, gradient(false));
    let mut app = App::open(layout.clone(), &config, feed, MockTags).unwrap();
    let result = app.run(&config.locales, &CancelFlag::new()).unwrap();
    assert_eq!(result.seen_urls, 1);
    assert_eq!(result.downloaded, 0);
    assert!(app.client().downloaded().is_empty());
}

#[test]
fn remembered_url_is_never_downloaded() {
    let (_temp, layout, config) = setup();
    let base = "/th?id=OHR.Known_EN-US1";
    layout.ensure().unwrap();
    fs::write(
        layout.url_history_path().as_std_path(),
        json!([url(base)]).to_string(),
    )
    .unwrap();

    let feed = MockFeed::with_entries(&[("20240501", base)]).serve(base, gradient(false));
    let mut app = App::open(layout, &config, feed, MockTags).unwrap();
    let entry = ArchiveEntry {
        start_date: "20240501".to_string(),
        end_date: "20240501".to_string(),
        url_base: base.to_string(),
        copyright: String::new(),
        headline: String::new(),
    };

    assert_eq!(app.process_entry(&entry).unwrap(), EntryOutcome::SeenUrl);
    assert!(app.client().downloaded().is_empty());
}

#[test]
fn duplicate_content_under_new_url_is_discarded_but_remembered() {
    let (_temp, layout, config) = setup();
    let first = "/th?id=OHR.Test_EN-US1";
    let second = "/th?id=OHR.Copy_EN-GB2";
    let feed = MockFeed::with_entries(&[("20240501", first), ("20240502", second)])
        .serve(first, gradient(false))
        .serve(second, gradient(false));
    let mut app = App::open(layout.clone(), &config, feed, MockTags).unwrap();
    let result = app.run(&config.locales, &CancelFlag::new()).unwrap();

    assert_eq!(result.downloaded, 1);
    assert_eq!(result.duplicates, 1);
    assert!(layout.save_dir().join("Test.jpg").as_std_path().is_file());
    assert!(!layout.save_dir().join("Copy.jpg").as_std_path().exists());
    assert!(app.history().contains(&url(second)));
    assert_eq!(app.fingerprints().len(), 1);
}

#[test]
fn failed_download_is_counted_and_processing_continues() {
    let (_temp, layout, config) = setup();
    let missing = "/th?id=OHR.Missing_EN-US1";
    let present = "/th?id=OHR.Present_EN-US2";
    let feed = MockFeed::with_entries(&[("20240501", missing), ("20240502", present)])
        .serve(present, gradient(true));

    let mut app = App::open(layout.clone(), &config, feed, MockTags).unwrap();
    let result = app.run(&config.locales, &CancelFlag::new()).unwrap();

    assert_eq!(result.errors, 1);
    assert_eq!(result.downloaded, 1);
    assert!(!app.history().contains(&url(missing)));
    assert!(layout.save_dir().join("Present.jpg").as_std_path().is_file());
    assert_eq!(app.client().downloaded(), vec![url(missing), url(present)]);
}

#[test]
fn name_clash_with_a_different_image_gets_a_counter() {
    let (_temp, layout, config) = setup();
    layout.ensure().unwrap();
    fs::write(layout.save_dir().join("Test.jpg").as_std_path(), gradient(true)).unwrap();
    let base = "/th?id=OHR.Test_EN-US1";
    let feed = MockFeed::with_entries(&[("20240501", base)]).serve(base, gradient(false));

    let mut app = App::open(layout.clone(), &config, feed, MockTags).unwrap();
    app.reconcile().unwrap();
    let result = app.run(&config.locales, &CancelFlag::new()).unwrap();

    assert_eq!(result.downloaded, 1);
    assert!(layout.save_dir().join("Test (1).jpg").as_std_path().is_file());
    assert!(app.fingerprints().is_known_file_name("Test (1).jpg"));
}

#[test]
fn cancelled_run_skips_remaining_locales() {
    let (_temp, layout, config) = setup();
    let feed = MockFeed::with_entries(&[("20240501", "/th?id=OHR.Test_EN-US1")]);
    let cancel = CancelFlag::new();
    cancel.cancel();

    let mut app = App::open(layout, &config, feed, MockTags).unwrap();
    let locales: Vec<Locale> = vec!["en-US".parse().unwrap(), "de-DE".parse().unwrap()];
    let result = app.run(&locales, &cancel).unwrap();

    assert!(result.cancelled);
    assert!(result.locales.is_empty());
    assert_eq!(app.client().fetch_count(), 0);
}

#[test]
fn dropping_without_finish_still_saves_catalogs() {
    let (_temp, layout, config) = setup();
    let base = "/th?id=OHR.Test_EN-US1";
    let feed = MockFeed::with_entries(&[("20240501", base)]).serve(base, gradient(false));

    {
        let mut app = App::open(layout.clone(), &config, feed, MockTags).unwrap();
        app.run(&config.locales, &CancelFlag::new()).unwrap();
    }

    let saved = fs::read_to_string(layout.fingerprints_path().as_std_path()).unwrap();
    assert!(saved.contains("Test.jpg"));
    let urls = fs::read_to_string(layout.url_history_path().as_std_path()).unwrap();
    assert!(urls.contains(&url(base)));
}

#[test]
fn tag_failure_does_not_lose_the_image() {
    let (_temp, layout, config) = setup();
    let base = "/th?id=OHR.Test_EN-US1";
    let feed = MockFeed::with_entries(&[("20240501", base)]).serve(base, gradient(false));

    let mut app = App::open(layout.clone(), &config, feed, FailingTags).unwrap();
    let result = app.run(&config.locales, &CancelFlag::new()).unwrap();

    assert_eq!(result.downloaded, 1);
    assert_eq!(result.errors, 0);
    assert!(layout.save_dir().join("Test.jpg").as_std_path().is_file());
}
