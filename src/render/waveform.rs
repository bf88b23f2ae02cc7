//! Loop progress bar with a waveform overview behind it

use eframe::egui::{self, Color32, Pos2, Rect, Stroke, Vec2};

/// Colors and size of the progress bar
#[derive(Clone)]
pub struct WaveformSettings {
    pub background: Color32,
    pub wave: Color32,
    pub played: Color32,
    pub playhead: Color32,
    /// Playhead color while the session waits between cycles
    pub waiting: Color32,
    pub height: f32,
}

impl Default for WaveformSettings {
    fn default() -> Self {
        Self {
            background: Color32::from_gray(30),
            wave: Color32::from_rgb(80, 120, 80),
            played: Color32::from_rgb(120, 200, 120),
            playhead: Color32::WHITE,
            waiting: Color32::from_rgb(230, 180, 60),
            height: 48.0,
        }
    }
}

/// Loop progress widget
#[derive(Default)]
pub struct LoopProgress {
    pub settings: WaveformSettings,
    /// Peak per bucket, recomputed only when the loop changes
    peaks: Vec<f32>,
}

impl LoopProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_peaks(&mut self, peaks: Vec<f32>) {
        self.peaks = peaks;
    }

    /// Draw with the playhead at `progress` (0..=1)
    pub fn show(
        &self,
        ui: &mut egui::Ui,
        progress: f32,
        waiting: bool,
        show_wave: bool,
    ) -> egui::Response {
        let size = Vec2::new(ui.available_width(), self.settings.height);
        let (response, painter) = ui.allocate_painter(size, egui::Sense::hover());
        let rect = response.rect;

        painter.rect_filled(rect, 4.0, self.settings.background);

        let playhead_x = rect.left() + progress.clamp(0.0, 1.0) * rect.width();

        if show_wave && !self.peaks.is_empty() {
            self.draw_peaks(&painter, rect, playhead_x);
        } else {
            let played = Rect::from_min_max(rect.min, Pos2::new(playhead_x, rect.bottom()));
            painter.rect_filled(played, 4.0, self.settings.wave);
        }

        let color = if waiting {
            self.settings.waiting
        } else {
            self.settings.playhead
        };
        painter.line_segment(
            [
                Pos2::new(playhead_x, rect.top()),
                Pos2::new(playhead_x, rect.bottom()),
            ],
            Stroke::new(2.0, color),
        );

        response
    }

    fn draw_peaks(&self, painter: &egui::Painter, rect: Rect, playhead_x: f32) {
        let center_y = rect.center().y;
        let height = rect.height() * 0.45;

        for (i, peak) in self.peaks.iter().enumerate() {
            let t = i as f32 / self.peaks.len() as f32;
            let x = rect.left() + t * rect.width();
            let amp = peak.min(1.0) * height;
            let color = if x <= playhead_x {
                self.settings.played
            } else {
                self.settings.wave
            };

            painter.line_segment(
                [Pos2::new(x, center_y - amp), Pos2::new(x, center_y + amp)],
                Stroke::new(1.0, color),
            );
        }
    }
}
