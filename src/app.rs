//! Tuner window
//!
//! Drives one tuner tick per repaint and draws the snapshot: start/stop
//! toggle, note and frequency, direction, offset needle and the six strings.

use eframe::egui;
use std::time::Instant;

use six_string_tuner::note::STRING_COUNT;
use six_string_tuner::{Direction, DisplaySnapshot, GuitarString, MicrophoneSource, Tuner};

const GREEN: egui::Color32 = egui::Color32::from_rgb(48, 209, 88);
const ORANGE: egui::Color32 = egui::Color32::from_rgb(255, 159, 10);
const GREY: egui::Color32 = egui::Color32::from_rgb(142, 142, 147);
const TRACK: egui::Color32 = egui::Color32::from_rgb(59, 59, 59);
const MARK: egui::Color32 = egui::Color32::from_rgb(99, 99, 102);
const ERROR_RED: egui::Color32 = egui::Color32::from_rgb(255, 69, 58);

pub struct TunerApp {
    tuner: Tuner<MicrophoneSource>,
    snapshot: DisplaySnapshot,
}

impl TunerApp {
    pub fn new(tuner: Tuner<MicrophoneSource>) -> Self {
        let snapshot = tuner.snapshot();
        Self { tuner, snapshot }
    }

    fn direction_text(direction: Option<Direction>) -> (&'static str, egui::Color32) {
        match direction {
            Some(Direction::InTune) => ("In tune", GREEN),
            Some(Direction::TuneUp) => ("Tune up", ORANGE),
            Some(Direction::TuneDown) => ("Tune down", ORANGE),
            None => ("", GREY),
        }
    }

    fn draw_tuner_display(&self, ui: &mut egui::Ui) {
        let snapshot = &self.snapshot;

        ui.vertical_centered(|ui| {
            if snapshot.is_listening {
                ui.label(
                    egui::RichText::new(&snapshot.current_note)
                        .size(36.0)
                        .color(egui::Color32::WHITE)
                        .strong(),
                );
                let frequency = snapshot
                    .frequency
                    .map(|f| format!("{:.2} Hz", f))
                    .unwrap_or_default();
                ui.label(egui::RichText::new(frequency).size(12.0).color(GREY));
            } else {
                ui.label(egui::RichText::new("Press start to tune").size(18.0).color(GREY));
            }

            let (text, color) = Self::direction_text(snapshot.direction);
            ui.label(egui::RichText::new(text).size(13.0).color(color));
        });

        self.draw_tuner_needle(ui);
        self.draw_strings(ui);

        if let Some(error) = &snapshot.error {
            ui.vertical_centered(|ui| {
                ui.label(egui::RichText::new(error).size(11.0).color(ERROR_RED));
            });
        }
    }

    fn draw_tuner_needle(&self, ui: &mut egui::Ui) {
        let (needle_area, _) =
            ui.allocate_exact_size(egui::vec2(ui.available_width(), 20.0), egui::Sense::hover());
        let needle_area = egui::Rect::from_center_size(needle_area.center(), egui::vec2(220.0, 20.0));
        let painter = ui.painter();

        painter.rect_filled(needle_area, 10.0, TRACK);

        let center_x = needle_area.center().x;
        let half_width = needle_area.width() / 2.0 - 10.0;
        painter.line_segment(
            [
                egui::pos2(center_x, needle_area.top() + 3.0),
                egui::pos2(center_x, needle_area.bottom() - 3.0),
            ],
            egui::Stroke::new(1.5, MARK),
        );

        for i in [-2i32, -1, 1, 2] {
            let mark_x = center_x + i as f32 * 0.25 * half_width;
            painter.line_segment(
                [
                    egui::pos2(mark_x, needle_area.center().y - 3.0),
                    egui::pos2(mark_x, needle_area.center().y + 3.0),
                ],
                egui::Stroke::new(1.0, MARK),
            );
        }

        if self.snapshot.is_listening && self.snapshot.frequency.is_some() {
            let range = self.tuner.config().position_range;
            let normalized = (self.snapshot.note_position / range).clamp(-1.0, 1.0);
            let color = match self.snapshot.direction {
                Some(Direction::InTune) => GREEN,
                _ => ORANGE,
            };
            painter.circle_filled(
                egui::pos2(center_x + normalized * half_width, needle_area.center().y),
                6.0,
                color,
            );
        }
    }

    fn draw_strings(&self, ui: &mut egui::Ui) {
        ui.add_space(8.0);
        ui.horizontal(|ui| {
            let spacing = ui.spacing().item_spacing.x;
            let width = 36.0 * STRING_COUNT as f32 + spacing * (STRING_COUNT - 1) as f32;
            ui.add_space(((ui.available_width() - width) / 2.0).max(0.0));

            for string in GuitarString::ALL {
                let tuned = self.snapshot.tuned_strings[string.index()];
                let color = if tuned { GREEN } else { GREY };
                ui.add_sized(
                    [36.0, 20.0],
                    egui::Label::new(egui::RichText::new(string.label()).size(12.0).color(color)),
                );
            }
        });
    }
}

impl eframe::App for TunerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.snapshot = self.tuner.tick(Instant::now());

        ctx.request_repaint();

        egui::CentralPanel::default()
            .frame(egui::Frame {
                fill: egui::Color32::from_rgba_premultiplied(31, 31, 31, 240),
                corner_radius: 8.0.into(),
                shadow: eframe::epaint::Shadow::NONE,
                outer_margin: egui::Margin::ZERO,
                inner_margin: egui::Margin::symmetric(0, 16),
                ..Default::default()
            })
            .show(ctx, |ui| {
                ui.vertical_centered(|ui| {
                    let label = if self.tuner.is_listening() {
                        "Stop Tuning"
                    } else {
                        "Start Tuning"
                    };
                    if ui.button(label).clicked() {
                        self.tuner.toggle();
                        self.snapshot = self.tuner.snapshot();
                    }
                });
                ui.add_space(8.0);
                self.draw_tuner_display(ui);
            });
    }
}
