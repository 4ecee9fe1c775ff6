use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub const RECORD_EXT: &str = "grid";
pub const THUMBNAIL_EXT: &str = "png";
pub const DEFAULT_AUTOSAVE_INTERVAL_SECS: u64 = 10;

const IMAGE_EXTS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

pub fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("org", "grids", "grids")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))
}

pub fn absolute_source_path(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Content identity of a grid: SHA-256 over the lexicographically sorted,
/// deduplicated member source paths, concatenated without separator.
pub fn grid_identity<S: AsRef<str>>(paths: &[S]) -> String {
    let mut sorted: Vec<&str> = paths.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable();
    sorted.dedup();
    let mut hasher = Sha256::new();
    for path in sorted {
        hasher.update(path.as_bytes());
    }
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceClass {
    GridRecord,
    Image,
    Text,
}

impl SourceClass {
    pub fn of(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if ext == RECORD_EXT {
            SourceClass::GridRecord
        } else if IMAGE_EXTS.contains(&ext.as_str()) {
            SourceClass::Image
        } else {
            SourceClass::Text
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
}

impl Viewport {
    pub fn clamped(x: f32, y: f32) -> Self {
        Self {
            x: x.clamp(0.0, 1.0),
            y: y.clamp(0.0, 1.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CellContent {
    File(PathBuf),
    InlineBytes { handle: String, data: Vec<u8> },
    GridLink { record: PathBuf, thumbnail: PathBuf },
}

impl CellContent {
    pub fn source_string(&self) -> String {
        match self {
            CellContent::File(path) => path.to_string_lossy().into_owned(),
            CellContent::InlineBytes { handle, .. } => handle.clone(),
            CellContent::GridLink { record, .. } => record.to_string_lossy().into_owned(),
        }
    }

    pub fn label(&self) -> String {
        match self {
            CellContent::File(path) | CellContent::GridLink { record: path, .. } => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string_lossy().into_owned()),
            CellContent::InlineBytes { handle, .. } => handle.clone(),
        }
    }

    fn identity_component(&self) -> String {
        match self {
            CellContent::File(path) | CellContent::GridLink { record: path, .. } => {
                absolute_source_path(path).to_string_lossy().into_owned()
            }
            CellContent::InlineBytes { handle, .. } => handle.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub content: CellContent,
    pub viewport: Viewport,
    pub position: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    File,
    Bytes,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CellRecord {
    source: String,
    source_type: SourceType,
    scroll_x: f32,
    scroll_y: f32,
    position: usize,
}

#[derive(Debug, Serialize)]
struct GridDocument {
    thumbnail: String,
    cells: Vec<CellRecord>,
}

// Read-side counterpart of GridDocument: cells stay raw JSON values so a
// single malformed entry can be dropped without losing the whole record.
#[derive(Debug, Deserialize)]
struct RawGridDocument {
    #[serde(default)]
    #[allow(dead_code)]
    thumbnail: String,
    #[serde(default)]
    cells: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLayout {
    pub rows: usize,
    pub cols: usize,
}

impl GridLayout {
    // rows = cols = ceil(n/2); exactly 2 cells get an extra column so the
    // split is never an ambiguous square.
    pub fn for_count(count: usize) -> Self {
        if count == 0 {
            return Self { rows: 0, cols: 0 };
        }
        let side = count.div_ceil(2);
        let cols = if count == 2 { side + 1 } else { side };
        Self { rows: side, cols }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Grid {
    cells: Vec<Cell>,
}

impl Grid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn push(&mut self, content: CellContent) -> usize {
        let position = self.cells.len();
        self.cells.push(Cell {
            content,
            viewport: Viewport::default(),
            position,
        });
        position
    }

    pub fn set_viewport(&mut self, position: usize, x: f32, y: f32) -> bool {
        match self.cells.get_mut(position) {
            Some(cell) => {
                cell.viewport = Viewport::clamped(x, y);
                true
            }
            None => false,
        }
    }

    pub fn member_sources(&self) -> Vec<String> {
        self.cells
            .iter()
            .map(|cell| cell.content.identity_component())
            .collect()
    }

    pub fn identity(&self) -> String {
        grid_identity(&self.member_sources())
    }

    pub fn layout(&self) -> GridLayout {
        GridLayout::for_count(self.cells.len())
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("cannot render a thumbnail for an empty grid")]
    EmptyGrid,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("grid record not found at {}", path.display())]
    RecordNotFound { path: PathBuf },
    #[error("malformed grid record {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Render(#[from] RenderError),
}

#[derive(Debug, Clone, Error)]
#[error("cell {index} dropped: {reason}")]
pub struct MalformedCell {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Error)]
#[error("remote store unavailable: {reason}")]
pub struct RemoteUnavailable {
    pub reason: String,
}

pub trait ThumbnailRenderer: Send + Sync {
    fn render_live(&self, grid: &Grid) -> Result<Vec<u8>, RenderError>;
    fn render_placeholder(&self, labels: &[String]) -> Result<Vec<u8>, RenderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorOutcome {
    Mirrored,
    Skipped,
}

pub trait ThumbnailMirror: Send + Sync {
    fn mirror(&self, identity: &str, thumbnail: &[u8]) -> Result<MirrorOutcome, RemoteUnavailable>;
}

#[derive(Debug)]
pub struct SavedGrid {
    pub identity: String,
    pub record_path: PathBuf,
    pub thumbnail_path: PathBuf,
    pub thumbnail: Vec<u8>,
}

#[derive(Debug)]
pub struct LoadedGrid {
    pub grid: Grid,
    pub warnings: Vec<MalformedCell>,
}

pub struct GridStore {
    data_dir: PathBuf,
}

impl GridStore {
    pub fn new(data_dir: PathBuf) -> Result<Self, StoreError> {
        fs::create_dir_all(&data_dir).map_err(|source| StoreError::Write {
            path: data_dir.clone(),
            source,
        })?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn record_path(&self, identity: &str) -> PathBuf {
        self.data_dir.join(format!("{identity}.{RECORD_EXT}"))
    }

    pub fn thumbnail_path(&self, identity: &str) -> PathBuf {
        self.data_dir.join(format!("{identity}.{THUMBNAIL_EXT}"))
    }

    #[instrument(skip(self, grid, renderer), fields(cells = grid.len()))]
    pub fn save(
        &self,
        grid: &Grid,
        renderer: &dyn ThumbnailRenderer,
    ) -> Result<SavedGrid, StoreError> {
        let identity = grid.identity();
        let thumbnail = renderer.render_live(grid)?;

        let thumbnail_path = self.thumbnail_path(&identity);
        self.write_atomic(&thumbnail_path, &thumbnail)?;

        let document = GridDocument {
            thumbnail: format!("{identity}.{THUMBNAIL_EXT}"),
            cells: grid.cells.iter().map(cell_record).collect(),
        };
        let payload = serde_json::to_string_pretty(&document).map_err(|source| {
            StoreError::Malformed {
                path: self.record_path(&identity),
                source,
            }
        })?;
        let record_path = self.record_path(&identity);
        self.write_atomic(&record_path, payload.as_bytes())?;

        debug!(%identity, path = %record_path.display(), "grid record written");
        Ok(SavedGrid {
            identity,
            record_path,
            thumbnail_path,
            thumbnail,
        })
    }

    #[instrument(skip(self, renderer))]
    pub fn load(
        &self,
        path: &Path,
        renderer: &dyn ThumbnailRenderer,
    ) -> Result<LoadedGrid, StoreError> {
        if !path.exists() {
            return Err(StoreError::RecordNotFound {
                path: path.to_path_buf(),
            });
        }
        let text = fs::read_to_string(path).map_err(|source| StoreError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawGridDocument =
            serde_json::from_str(&text).map_err(|source| StoreError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;

        let mut warnings = Vec::new();
        let mut cells: Vec<Cell> = Vec::new();
        for (index, value) in raw.cells.into_iter().enumerate() {
            let record: CellRecord = match serde_json::from_value(value) {
                Ok(record) => record,
                Err(err) => {
                    warn!(index, %err, record = %path.display(), "dropping malformed cell");
                    warnings.push(MalformedCell {
                        index,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };
            let viewport = Viewport::clamped(record.scroll_x, record.scroll_y);
            let content = match record.source_type {
                SourceType::Bytes => CellContent::InlineBytes {
                    handle: record.source,
                    data: Vec::new(),
                },
                SourceType::File => {
                    let source = PathBuf::from(&record.source);
                    if SourceClass::of(&source) == SourceClass::GridRecord {
                        match self.ensure_link_thumbnail(&source, renderer) {
                            Ok(thumbnail) => CellContent::GridLink {
                                record: source,
                                thumbnail,
                            },
                            Err(err) => {
                                warn!(index, err = %format!("{err:#}"), "dropping nested grid cell");
                                warnings.push(MalformedCell {
                                    index,
                                    reason: format!("{err:#}"),
                                });
                                continue;
                            }
                        }
                    } else {
                        CellContent::File(source)
                    }
                }
            };
            cells.push(Cell {
                content,
                viewport,
                position: record.position,
            });
        }

        // Re-densify so positions stay contiguous after dropped cells.
        cells.sort_by_key(|cell| cell.position);
        for (index, cell) in cells.iter_mut().enumerate() {
            cell.position = index;
        }

        Ok(LoadedGrid {
            grid: Grid { cells },
            warnings,
        })
    }

    /// Returns the cached thumbnail for a referenced grid record, synthesizing
    /// a placeholder mosaic from the record's member labels when missing.
    fn ensure_link_thumbnail(
        &self,
        record: &Path,
        renderer: &dyn ThumbnailRenderer,
    ) -> Result<PathBuf> {
        let identity = record
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("grid record {} has no file stem", record.display()))?;
        let thumbnail = self.thumbnail_path(&identity);
        if thumbnail.exists() {
            return Ok(thumbnail);
        }
        let labels = self.member_labels(record)?;
        let bytes = renderer.render_placeholder(&labels)?;
        self.write_atomic(&thumbnail, &bytes)?;
        debug!(record = %record.display(), thumbnail = %thumbnail.display(), "synthesized placeholder thumbnail");
        Ok(thumbnail)
    }

    fn member_labels(&self, record: &Path) -> Result<Vec<String>, StoreError> {
        if !record.exists() {
            return Err(StoreError::RecordNotFound {
                path: record.to_path_buf(),
            });
        }
        let text = fs::read_to_string(record).map_err(|source| StoreError::Read {
            path: record.to_path_buf(),
            source,
        })?;
        let raw: RawGridDocument =
            serde_json::from_str(&text).map_err(|source| StoreError::Malformed {
                path: record.to_path_buf(),
                source,
            })?;
        let mut labels = Vec::new();
        for (index, value) in raw.cells.into_iter().enumerate() {
            match serde_json::from_value::<CellRecord>(value) {
                Ok(cell) => {
                    let source = PathBuf::from(&cell.source);
                    labels.push(
                        source
                            .file_name()
                            .map(|name| name.to_string_lossy().into_owned())
                            .unwrap_or(cell.source),
                    );
                }
                Err(err) => {
                    warn!(index, %err, record = %record.display(), "skipping malformed cell label");
                }
            }
        }
        Ok(labels)
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
        let tmp = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => path.with_extension(format!("{ext}.tmp")),
            None => path.with_extension("tmp"),
        };
        let write = |tmp: &Path| -> std::io::Result<()> {
            let mut file = File::create(tmp)?;
            file.write_all(bytes)?;
            file.flush()?;
            fs::rename(tmp, path)
        };
        write(&tmp).map_err(|source| StoreError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn cell_record(cell: &Cell) -> CellRecord {
    let (source, source_type) = match &cell.content {
        CellContent::File(path) => (path.to_string_lossy().into_owned(), SourceType::File),
        CellContent::GridLink { record, .. } => {
            (record.to_string_lossy().into_owned(), SourceType::File)
        }
        CellContent::InlineBytes { handle, .. } => (handle.clone(), SourceType::Bytes),
    };
    CellRecord {
        source,
        source_type,
        scroll_x: cell.viewport.x,
        scroll_y: cell.viewport.y,
        position: cell.position,
    }
}

// Depth-1 back-stack: punching in remembers exactly one grid to return to.
#[derive(Debug, Default)]
pub struct NavigationStack {
    current: Option<PathBuf>,
    previous: Option<PathBuf>,
}

impl NavigationStack {
    pub fn current(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    pub fn previous(&self) -> Option<&Path> {
        self.previous.as_deref()
    }

    pub fn set_current(&mut self, path: PathBuf) {
        self.current = Some(path);
    }

    pub fn punch_in(&mut self, target: PathBuf) {
        self.previous = self.current.take();
        self.current = Some(target);
    }

    pub fn punch_out(&mut self) -> Option<PathBuf> {
        let previous = self.previous.take()?;
        self.current = Some(previous.clone());
        Some(previous)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Loading,
    Ready,
    Saving,
    Exiting,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    GridOpened { record: Option<PathBuf>, cells: usize },
    GridSaved { record: PathBuf },
    ThumbnailMirrored { identity: String },
    MirrorSkipped { identity: String },
    PunchedIn { target: PathBuf },
    PunchedOut { target: PathBuf },
    CellDropped { warning: MalformedCell },
}

pub struct GridSession {
    store: GridStore,
    renderer: Arc<dyn ThumbnailRenderer>,
    mirror: Option<Arc<dyn ThumbnailMirror>>,
    nav: NavigationStack,
    grid: Grid,
    state: SessionState,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl GridSession {
    pub fn new(
        store: GridStore,
        renderer: Arc<dyn ThumbnailRenderer>,
        mirror: Option<Arc<dyn ThumbnailMirror>>,
    ) -> Self {
        Self {
            store,
            renderer,
            mirror,
            nav: NavigationStack::default(),
            grid: Grid::new(),
            state: SessionState::Uninitialized,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn current_record(&self) -> Option<&Path> {
        self.nav.current()
    }

    pub fn events(&self) -> Arc<Mutex<Vec<SessionEvent>>> {
        Arc::clone(&self.events)
    }

    fn push_event(&self, event: SessionEvent) {
        self.events.lock().push(event);
    }

    fn push_warnings(&self, warnings: &[MalformedCell]) {
        for warning in warnings {
            self.push_event(SessionEvent::CellDropped {
                warning: warning.clone(),
            });
        }
    }

    #[instrument(skip(self, sources), fields(sources = sources.len()))]
    pub fn open(&mut self, sources: &[PathBuf]) -> Result<Vec<MalformedCell>> {
        self.state = SessionState::Loading;

        // A single grid-record source reopens that grid; anything else builds
        // a fresh grid in which record sources become nested-grid links.
        let warnings = if let [source] = sources {
            if SourceClass::of(source) == SourceClass::GridRecord {
                let path = absolute_source_path(source);
                let loaded = match self.store.load(&path, self.renderer.as_ref()) {
                    Ok(loaded) => loaded,
                    Err(err) => {
                        self.state = SessionState::Uninitialized;
                        return Err(err).context("failed to reopen grid record");
                    }
                };
                self.grid = loaded.grid;
                self.nav.set_current(path);
                loaded.warnings
            } else {
                self.build_fresh(sources)
            }
        } else {
            self.build_fresh(sources)
        };

        self.state = SessionState::Ready;
        self.push_event(SessionEvent::GridOpened {
            record: self.nav.current().map(Path::to_path_buf),
            cells: self.grid.len(),
        });
        self.push_warnings(&warnings);
        info!(cells = self.grid.len(), "grid opened");
        Ok(warnings)
    }

    fn build_fresh(&mut self, sources: &[PathBuf]) -> Vec<MalformedCell> {
        let mut grid = Grid::new();
        let mut warnings = Vec::new();
        for (index, source) in sources.iter().enumerate() {
            if SourceClass::of(source) == SourceClass::GridRecord {
                let record = absolute_source_path(source);
                match self
                    .store
                    .ensure_link_thumbnail(&record, self.renderer.as_ref())
                {
                    Ok(thumbnail) => {
                        grid.push(CellContent::GridLink { record, thumbnail });
                    }
                    Err(err) => {
                        warn!(index, err = %format!("{err:#}"), "dropping nested grid source");
                        warnings.push(MalformedCell {
                            index,
                            reason: format!("{err:#}"),
                        });
                    }
                }
            } else {
                grid.push(CellContent::File(source.clone()));
            }
        }
        self.grid = grid;
        warnings
    }

    #[instrument(skip(self))]
    pub fn save(&mut self) -> Result<PathBuf> {
        match self.state {
            SessionState::Uninitialized | SessionState::Loading => {
                return Err(anyhow!("no grid is open"));
            }
            SessionState::Saving => {
                return Err(anyhow!("a save is already in progress"));
            }
            SessionState::Ready | SessionState::Exiting => {}
        }
        self.state = SessionState::Saving;
        let result = self.save_inner();
        self.state = SessionState::Ready;
        result
    }

    fn save_inner(&mut self) -> Result<PathBuf> {
        let saved = self
            .store
            .save(&self.grid, self.renderer.as_ref())
            .context("failed to persist grid")?;

        // Best-effort: remote trouble never fails the local save.
        if let Some(mirror) = &self.mirror {
            match mirror.mirror(&saved.identity, &saved.thumbnail) {
                Ok(MirrorOutcome::Mirrored) => {
                    self.push_event(SessionEvent::ThumbnailMirrored {
                        identity: saved.identity.clone(),
                    });
                }
                Ok(MirrorOutcome::Skipped) => {
                    self.push_event(SessionEvent::MirrorSkipped {
                        identity: saved.identity.clone(),
                    });
                }
                Err(err) => {
                    warn!(identity = %saved.identity, %err, "remote mirror failed; local save kept");
                }
            }
        }

        self.nav.set_current(saved.record_path.clone());
        self.push_event(SessionEvent::GridSaved {
            record: saved.record_path.clone(),
        });
        info!(identity = %saved.identity, path = %saved.record_path.display(), "grid saved");
        Ok(saved.record_path)
    }

    /// Timer entry point: a no-op unless the session is idle in `Ready`,
    /// which also guarantees a tick never overlaps a save in progress.
    pub fn autosave_tick(&mut self) -> Result<Option<PathBuf>> {
        if self.state != SessionState::Ready {
            return Ok(None);
        }
        self.save().map(Some)
    }

    #[instrument(skip(self))]
    pub fn punch_in(&mut self, target: &Path) -> Result<Vec<MalformedCell>> {
        // Save first so the current viewport state survives the switch.
        self.save().context("failed to save grid before punch-in")?;

        let target = absolute_source_path(target);
        self.state = SessionState::Loading;
        let loaded = match self.store.load(&target, self.renderer.as_ref()) {
            Ok(loaded) => loaded,
            Err(err) => {
                self.state = SessionState::Ready;
                return Err(err).context("failed to load punch-in target");
            }
        };
        self.nav.punch_in(target.clone());
        self.grid = loaded.grid;
        self.state = SessionState::Ready;

        self.push_event(SessionEvent::PunchedIn { target });
        self.push_warnings(&loaded.warnings);
        Ok(loaded.warnings)
    }

    /// Returns `None` when there is nothing to return to; that is not an
    /// error, the depth-1 history is simply empty.
    #[instrument(skip(self))]
    pub fn punch_out(&mut self) -> Result<Option<Vec<MalformedCell>>> {
        let Some(target) = self.nav.previous().map(Path::to_path_buf) else {
            return Ok(None);
        };

        self.save().context("failed to save grid before punch-out")?;

        self.state = SessionState::Loading;
        let loaded = match self.store.load(&target, self.renderer.as_ref()) {
            Ok(loaded) => loaded,
            Err(err) => {
                self.state = SessionState::Ready;
                return Err(err).context("failed to load punch-out target");
            }
        };
        self.nav.punch_out();
        self.grid = loaded.grid;
        self.state = SessionState::Ready;

        self.push_event(SessionEvent::PunchedOut { target });
        self.push_warnings(&loaded.warnings);
        Ok(Some(loaded.warnings))
    }

    pub fn pan(&mut self, position: usize, x: f32, y: f32) -> Result<()> {
        if !self.grid.set_viewport(position, x, y) {
            return Err(anyhow!("no cell at position {position}"));
        }
        Ok(())
    }

    /// Final save before shutdown; no session ends without a durable snapshot.
    pub fn exit(&mut self) -> Result<PathBuf> {
        let path = self.save().context("final save on exit failed")?;
        self.state = SessionState::Exiting;
        Ok(path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data_dir: Option<PathBuf>,
    pub autosave_interval_secs: u64,
    pub remote: Option<RemoteSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: None,
            autosave_interval_secs: DEFAULT_AUTOSAVE_INTERVAL_SECS,
            remote: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSettings {
    pub endpoint: String,
    pub timeout_ms: u64,
    pub slurp_method: String,
}

impl Default for RemoteSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            timeout_ms: 2000,
            slurp_method: "grid_thumbnail".to_string(),
        }
    }
}

impl Settings {
    /// Missing file means defaults; a file that exists but does not parse is
    /// an error worth surfacing at startup.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}
