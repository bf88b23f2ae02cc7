//! memloop - loop a recording with timed pauses for memorization
//!
//! Desktop front end. Owns the one playback engine (wrapped in the
//! repetition scheduler), polls background loads and pumps the timers
//! every frame.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use eframe::egui;

use memloop::audio::{spawn_load, AudioSource, CpalOutput, PendingLoad, PlaybackEngine};
use memloop::clock::SystemClock;
use memloop::library::{LoopCategory, LoopLibrary};
use memloop::repetition::{Phase, RepetitionScheduler, MAX_INTERVAL_SECONDS};
use memloop::settings::AppSettings;
use memloop::status::PlayerStatus;

mod render;

use render::LoopProgress;

const WAVEFORM_POINTS: usize = 600;

fn main() -> eframe::Result<()> {
    env_logger::init();
    log::info!("Starting memloop");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([760.0, 420.0])
            .with_title("memloop"),
        ..Default::default()
    };

    eframe::run_native(
        "memloop",
        options,
        Box::new(|cc| Ok(Box::new(MemloopApp::new(cc)))),
    )
}

/// Deferred library actions, applied after the list is drawn
enum LibraryAction {
    Play(u64),
    Remove(u64),
    Rename(u64),
}

struct MemloopApp {
    scheduler: RepetitionScheduler<PlaybackEngine>,
    status: Rc<RefCell<PlayerStatus>>,
    settings: AppSettings,
    library: LoopLibrary,
    progress: LoopProgress,

    source_input: String,
    pending: Option<PendingLoad>,
    /// Saved loop to start once the pending load finishes
    autostart: Option<u64>,
    message: String,

    interval: u32,
    volume: f32,

    show_library: bool,
    category_filter: Option<LoopCategory>,
    new_title: String,
    new_category: LoopCategory,
    selected: Option<u64>,
    rename_input: String,
}

impl MemloopApp {
    fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let settings = AppSettings::load();
        let library = LoopLibrary::load();

        let clock = Rc::new(SystemClock);
        let mut engine = PlaybackEngine::with_config(
            Box::new(CpalOutput::new()),
            clock.clone(),
            settings.engine_config(),
        );
        engine.set_volume(settings.volume);

        let mut scheduler = RepetitionScheduler::new(engine, clock, settings.interval_seconds);
        let status = PlayerStatus::attach(&mut scheduler);

        let mut app = Self {
            scheduler,
            status,
            interval: settings.interval_seconds,
            volume: settings.volume,
            source_input: settings.last_source.clone().unwrap_or_default(),
            settings,
            library,
            progress: LoopProgress::new(),
            pending: None,
            autostart: None,
            message: "No loop loaded".to_string(),
            show_library: false,
            category_filter: None,
            new_title: String::new(),
            new_category: LoopCategory::default(),
            selected: None,
            rename_input: String::new(),
        };

        if !app.source_input.is_empty() {
            app.begin_load();
        }
        app
    }

    /// Start loading whatever is in the source field
    fn begin_load(&mut self) {
        match AudioSource::parse(&self.source_input) {
            Ok(source) => {
                let timeout = Duration::from_secs(self.settings.fetch_timeout_secs);
                let pending = spawn_load(source, timeout);
                self.message = format!("Loading {}...", pending.label());
                // Replacing an older pending load abandons it
                self.pending = Some(pending);
            }
            Err(e) => {
                log::error!("Invalid source: {}", e);
                self.message = format!("Error: {}", e);
                self.autostart = None;
            }
        }
    }

    fn poll_load(&mut self) {
        let Some(result) = self.pending.as_ref().and_then(|p| p.poll()) else {
            return;
        };
        let label = self
            .pending
            .take()
            .map(|p| p.label().to_string())
            .unwrap_or_default();

        match result {
            Ok(audio) => {
                self.progress.set_peaks(audio.waveform(WAVEFORM_POINTS));
                self.scheduler.stop();
                self.scheduler.transport_mut().install(audio);
                *self.status.borrow_mut() = PlayerStatus::read(&self.scheduler);
                self.settings.last_source = Some(self.source_input.trim().to_string());
                self.message = format!("Loaded {}", label);

                if let Some(id) = self.autostart.take() {
                    self.scheduler.start();
                    if let Err(e) = self.library.record_play(id) {
                        log::warn!("Could not count play: {}", e);
                    }
                    self.save_library();
                }
            }
            Err(e) => {
                self.message = format!("Error: {}", e);
                self.autostart = None;
            }
        }
    }

    fn save_library(&mut self) {
        if let Err(e) = self.library.save() {
            log::error!("Failed to save library: {}", e);
            self.message = format!("Error: {}", e);
        }
    }

    fn apply_library_action(&mut self, action: LibraryAction) {
        match action {
            LibraryAction::Play(id) => {
                let Some(saved) = self.library.get(id) else {
                    return;
                };
                self.source_input = saved.source.clone();
                self.interval = saved.interval_seconds;
                self.scheduler.set_interval(self.interval);
                self.autostart = Some(id);
                self.begin_load();
            }
            LibraryAction::Remove(id) => {
                if self.library.remove(id).is_ok() {
                    if self.selected == Some(id) {
                        self.selected = None;
                    }
                    self.save_library();
                }
            }
            LibraryAction::Rename(id) => match self.library.rename(id, &self.rename_input) {
                Ok(()) => self.save_library(),
                Err(e) => self.message = format!("Error: {}", e),
            },
        }
    }

    fn current_settings(&self) -> AppSettings {
        AppSettings {
            volume: self.volume,
            interval_seconds: self.interval,
            ..self.settings.clone()
        }
    }

    fn transport_button_text(&self) -> &'static str {
        match self.scheduler.phase() {
            Phase::Idle => "▶ Start",
            Phase::Playing { paused: true } | Phase::Waiting { paused: true, .. } => "▶ Resume",
            _ => "⏸ Pause",
        }
    }

    /// Unlike `toggle`, a running countdown pauses instead of resuming
    fn transport_button(&mut self) {
        match self.scheduler.phase() {
            Phase::Idle => self.scheduler.start(),
            Phase::Playing { paused: true } | Phase::Waiting { paused: true, .. } => {
                self.scheduler.resume()
            }
            _ => self.scheduler.pause(),
        }
    }

    fn library_panel(&mut self, ui: &mut egui::Ui) -> Option<LibraryAction> {
        let mut action = None;

        ui.heading("Saved loops");
        ui.separator();

        ui.horizontal(|ui| {
            ui.label("Title:");
            ui.text_edit_singleline(&mut self.new_title);
        });
        ui.horizontal(|ui| {
            egui::ComboBox::from_id_salt("new_category")
                .selected_text(self.new_category.name())
                .show_ui(ui, |ui| {
                    for category in LoopCategory::all() {
                        ui.selectable_value(&mut self.new_category, *category, category.name());
                    }
                });

            let can_save = !self.source_input.trim().is_empty();
            if ui
                .add_enabled(can_save, egui::Button::new("💾 Save current"))
                .clicked()
            {
                match self.library.add(
                    &self.new_title,
                    self.new_category,
                    &self.source_input,
                    self.interval,
                ) {
                    Ok(id) => {
                        self.new_title.clear();
                        self.selected = Some(id);
                        self.save_library();
                    }
                    Err(e) => self.message = format!("Error: {}", e),
                }
            }
        });

        ui.separator();

        ui.horizontal_wrapped(|ui| {
            ui.selectable_value(&mut self.category_filter, None, "All");
            for category in LoopCategory::all() {
                ui.selectable_value(&mut self.category_filter, Some(*category), category.name());
            }
        });

        egui::ScrollArea::vertical().show(ui, |ui| {
            let entries: Vec<_> = match self.category_filter {
                Some(category) => self.library.by_category(category).cloned().collect(),
                None => self.library.iter().cloned().collect(),
            };
            if entries.is_empty() {
                ui.weak("Nothing saved yet");
            }
            for saved in entries {
                ui.horizontal(|ui| {
                    if ui.small_button("▶").clicked() {
                        action = Some(LibraryAction::Play(saved.id));
                    }
                    let is_selected = self.selected == Some(saved.id);
                    if ui.selectable_label(is_selected, &saved.title).clicked() {
                        self.selected = Some(saved.id);
                        self.rename_input = saved.title.clone();
                    }
                    ui.weak(format!(
                        "{} · {}s · played {}",
                        saved.category.name(),
                        saved.interval_seconds,
                        saved.play_count
                    ));
                    if ui.small_button("✖").clicked() {
                        action = Some(LibraryAction::Remove(saved.id));
                    }
                });
            }
        });

        if let Some(id) = self.selected {
            ui.separator();
            ui.horizontal(|ui| {
                ui.text_edit_singleline(&mut self.rename_input);
                if ui.button("Rename").clicked() {
                    action = Some(LibraryAction::Rename(id));
                }
            });
        }

        action
    }
}

impl eframe::App for MemloopApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.poll_load();
        self.scheduler.pump();

        let space = ctx.input(|i| i.key_pressed(egui::Key::Space));
        if space && !ctx.wants_keyboard_input() && self.scheduler.transport().is_loaded() {
            self.scheduler.toggle();
        }

        if self.scheduler.is_active() || self.pending.is_some() {
            // Wake for the next timer so a cycle end is not handled a frame late
            let mut wait = Duration::from_millis(self.settings.time_update_ms);
            if let Some(deadline) = self.scheduler.next_deadline() {
                wait = wait.min(deadline.saturating_duration_since(Instant::now()));
            }
            ctx.request_repaint_after(wait);
        }

        // Top panel
        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("memloop");
                ui.separator();

                ui.label("Source:");
                let response = ui.add(
                    egui::TextEdit::singleline(&mut self.source_input)
                        .hint_text("URL, file path or data: URI")
                        .desired_width(300.0),
                );
                let submitted =
                    response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));

                if ui.button("Load").clicked() || submitted {
                    self.autostart = None;
                    self.begin_load();
                }

                if ui.button("📂 Open").clicked() {
                    if let Some(path) = rfd::FileDialog::new()
                        .add_filter("Audio", &["wav", "mp3", "flac", "ogg", "m4a", "aac"])
                        .pick_file()
                    {
                        self.source_input = path.display().to_string();
                        self.autostart = None;
                        self.begin_load();
                    }
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.toggle_value(&mut self.show_library, "📚 Library");
                });
            });
        });

        // Bottom status bar
        egui::TopBottomPanel::bottom("status_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.small(&self.message);
                if self.pending.is_some() {
                    ui.spinner();
                }
            });
        });

        if self.show_library {
            let mut action = None;
            egui::SidePanel::right("library_panel")
                .min_width(260.0)
                .show(ctx, |ui| {
                    action = self.library_panel(ui);
                });
            if let Some(action) = action {
                self.apply_library_action(action);
            }
        }

        // Main loop display
        egui::CentralPanel::default().show(ctx, |ui| {
            let status = *self.status.borrow();
            let waiting = status.session.remaining_seconds.is_some();

            ui.add_space(8.0);
            self.progress
                .show(ui, status.progress(), waiting, self.settings.show_waveform);

            ui.horizontal(|ui| {
                ui.label(format!(
                    "{} / {}",
                    format_seconds(status.position),
                    format_seconds(status.duration)
                ));
                ui.separator();
                ui.strong(status.label());
                ui.separator();
                ui.label(format!("Cycles: {}", status.session.cycle_count));
            });

            ui.add_space(8.0);

            ui.horizontal(|ui| {
                let loaded = self.scheduler.transport().is_loaded();
                if ui
                    .add_enabled(loaded, egui::Button::new(self.transport_button_text()))
                    .clicked()
                {
                    self.transport_button();
                }
                if ui
                    .add_enabled(self.scheduler.is_active(), egui::Button::new("⏹ Stop"))
                    .clicked()
                {
                    self.scheduler.stop();
                }
            });

            ui.add_space(8.0);

            ui.horizontal(|ui| {
                ui.label("Pause between loops:");
                if ui
                    .add(egui::Slider::new(&mut self.interval, 0..=MAX_INTERVAL_SECONDS).suffix(" s"))
                    .changed()
                {
                    self.scheduler.set_interval(self.interval);
                }
                if self.interval == 0 {
                    ui.weak("continuous");
                }
            });

            ui.horizontal(|ui| {
                ui.label("Volume:");
                if ui
                    .add(egui::Slider::new(&mut self.volume, 0.0..=1.0).show_value(false))
                    .changed()
                {
                    self.scheduler.transport_mut().set_volume(self.volume);
                }
                ui.checkbox(&mut self.settings.show_waveform, "Waveform");
            });
        });
    }
}

impl Drop for MemloopApp {
    fn drop(&mut self) {
        self.scheduler.stop();
        self.current_settings().save();
    }
}

/// Format seconds as MM:SS.t
fn format_seconds(secs: f64) -> String {
    let tenths = (secs.max(0.0) * 10.0).floor() as u64;
    let mins = tenths / 600;
    let rest = tenths % 600;
    format!("{:02}:{:02}.{}", mins, rest / 10, rest % 10)
}
