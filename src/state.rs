use std::path::Path;

use crate::data::filter::FilterState;
use crate::data::loader;
use crate::data::model::{DataType, Dataset};
use crate::format::KpiPanel;
use crate::kpi::{evaluate, KpiResult};
use crate::settings::Settings;

// ---------------------------------------------------------------------------
// Dashboard state
// ---------------------------------------------------------------------------

/// Everything the KPI strip needs, independent of rendering.
///
/// The KPI is a pure function of (dataset, filters, settings); every setter
/// recomputes it from scratch and nothing else is carried between calls.
#[derive(Debug, Default)]
pub struct DashboardState {
    /// Loaded dataset (None until a file is loaded).
    pub dataset: Option<Dataset>,

    /// Current filter selections.
    pub filters: FilterState,

    /// Settings, including the user's currency override.
    pub settings: Settings,

    /// KPIs for the current filters (cached). `None` renders nothing.
    pub kpi: Option<KpiResult>,

    /// Status / error message shown to the user.
    pub status_message: Option<String>,
}

impl DashboardState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Ingest a newly loaded dataset, reset filters and recompute.
    pub fn set_dataset(&mut self, dataset: Dataset) {
        self.filters = FilterState::for_dataset(&dataset);
        self.dataset = Some(dataset);
        self.status_message = None;
        self.refresh();
    }

    /// Load a dataset file. On failure the previous dataset stays and the
    /// error is kept as the status message.
    pub fn load_file(&mut self, path: &Path) -> bool {
        match loader::load_file(path) {
            Ok(dataset) => {
                self.set_dataset(dataset);
                true
            }
            Err(err) => {
                log::error!("{err:#}");
                self.status_message = Some(format!("{err:#}"));
                false
            }
        }
    }

    /// Recompute `kpi` after any change.
    pub fn refresh(&mut self) {
        self.kpi = self
            .dataset
            .as_ref()
            .and_then(|ds| evaluate(ds, &self.filters, &self.settings));
    }

    /// Current KPI strip, if anything resolved.
    pub fn panel(&self) -> Option<KpiPanel> {
        KpiPanel::render(self.kpi.as_ref())
    }

    /// Replace all filters at once. Geographies form a set.
    pub fn set_filters(&mut self, mut filters: FilterState) {
        filters.dedupe_geographies();
        self.filters = filters;
        self.refresh();
    }

    /// Toggle a single geography in the selection.
    pub fn toggle_geography(&mut self, geography: &str) {
        self.filters.toggle_geography(geography);
        self.refresh();
    }

    /// Back to "all geographies".
    pub fn select_all_geographies(&mut self) {
        self.filters.geographies.clear();
        self.refresh();
    }

    pub fn set_segment_type(&mut self, segment_type: Option<String>) {
        self.filters.segment_type = segment_type;
        self.refresh();
    }

    pub fn set_data_type(&mut self, data_type: DataType) {
        self.filters.data_type = data_type;
        self.refresh();
    }

    pub fn set_aggregation_level(&mut self, level: Option<u32>) {
        self.filters.aggregation_level = level;
        self.refresh();
    }

    /// Display-currency override; `None` goes back to the dataset's currency.
    pub fn set_currency(&mut self, currency: Option<String>) {
        self.settings.currency = currency;
        self.refresh();
    }

    pub fn dismiss_message(&mut self) {
        self.status_message = None;
    }
}
