use crate::game::{JudgmentEngine, LiveNote, NoteState, JUDGE_LINE};
use crate::input::LANE_LABELS;
use macroquad::prelude::*;
use shared::{Judgment, LANE_COUNT};

pub const WINDOW_WIDTH: i32 = 1080;
pub const WINDOW_HEIGHT: i32 = 720;

const LANE_SPACING: f32 = 98.0;
const FIRST_LANE_X: f32 = 198.0;
const NOTE_WIDTH: f32 = 64.0;
const NOTE_HEIGHT: f32 = 20.0;
const HOLD_BODY_WIDTH: f32 = 56.0;
const KEY_ROW_Y: f32 = 660.0;

/// What the playfield shows besides the notes
#[derive(Debug, Clone)]
pub struct Hud<'a> {
    pub name: &'a str,
    pub connected: bool,
    pub elapsed: f64,
}

/// Horizontal center of `lane`.
pub fn lane_x(lane: u8) -> f32 {
    f32::from(lane.saturating_sub(1)) * LANE_SPACING + FIRST_LANE_X
}

/// Vertical extent `(top, bottom)` of a hold body. While the note is being
/// held its head stays on the judge line, so the body shrinks.
pub fn hold_span(live: &LiveNote, elapsed: f64) -> (f32, f32) {
    let mut head = live.position(elapsed);
    if live.state == NoteState::Holding {
        head = head.min(JUDGE_LINE);
    }
    let tail = live.tail_position(elapsed).min(head);
    (tail as f32, head as f32)
}

fn judgment_color(judgment: Judgment) -> Color {
    match judgment {
        Judgment::Excellent => Color::from_rgba(0, 255, 255, 255),
        Judgment::VeryGood => GREEN,
        Judgment::Good => Color::from_rgba(170, 255, 68, 255),
        Judgment::Fair => YELLOW,
        Judgment::Poor => ORANGE,
        Judgment::NoCredit => RED,
    }
}

pub struct Renderer {
    width: f32,
    height: f32,
}

impl Renderer {
    pub fn new(width: i32, height: i32) -> Self {
        Renderer {
            width: width as f32,
            height: height as f32,
        }
    }

    pub fn render(&mut self, engine: &JudgmentEngine, hud: &Hud) {
        clear_background(Color::from_rgba(26, 26, 26, 255));

        self.draw_lanes();
        for live in engine.visible_notes(hud.elapsed) {
            self.draw_note(live, hud.elapsed);
        }
        self.draw_judge_line();
        self.draw_keys(engine);

        if let Some(banner) = engine.banner() {
            self.draw_banner(banner.judgment);
        }
        if hud.elapsed < 0.0 {
            self.draw_countdown(hud.elapsed);
        }
        self.draw_ui(engine, hud);
    }

    fn draw_lanes(&mut self) {
        for lane in 1..=LANE_COUNT as u8 {
            let x = lane_x(lane);
            draw_line(
                x - LANE_SPACING / 2.0,
                0.0,
                x - LANE_SPACING / 2.0,
                self.height,
                1.0,
                Color::from_rgba(51, 51, 51, 255),
            );
        }
        let right_edge = lane_x(LANE_COUNT as u8) + LANE_SPACING / 2.0;
        draw_line(right_edge, 0.0, right_edge, self.height, 1.0, Color::from_rgba(51, 51, 51, 255));
    }

    fn draw_judge_line(&mut self) {
        draw_line(0.0, JUDGE_LINE as f32, self.width, JUDGE_LINE as f32, 5.0, WHITE);
    }

    fn draw_note(&mut self, live: &LiveNote, elapsed: f64) {
        let x = lane_x(live.note.lane);
        let color = match live.state {
            NoteState::Hittable => Color::from_rgba(0, 170, 255, 255),
            NoteState::Holding => YELLOW,
            _ => Color::from_rgba(220, 220, 220, 255),
        };

        if live.note.is_hold() {
            let (top, bottom) = hold_span(live, elapsed);
            draw_rectangle(
                x - HOLD_BODY_WIDTH / 2.0,
                top,
                HOLD_BODY_WIDTH,
                bottom - top,
                Color::from_rgba(136, 136, 136, 160),
            );
            self.draw_head(x, bottom, color);
        } else {
            self.draw_head(x, live.position(elapsed) as f32, color);
        }
    }

    fn draw_head(&mut self, x: f32, y: f32, color: Color) {
        draw_rectangle(x - NOTE_WIDTH / 2.0, y - NOTE_HEIGHT / 2.0, NOTE_WIDTH, NOTE_HEIGHT, color);
        draw_rectangle_lines(x - NOTE_WIDTH / 2.0, y - NOTE_HEIGHT / 2.0, NOTE_WIDTH, NOTE_HEIGHT, 2.0, WHITE);
    }

    /// Pressed lanes light up; pressed lanes beyond the active ones are
    /// drawn as limited.
    fn draw_keys(&mut self, engine: &JudgmentEngine) {
        for lane in 1..=LANE_COUNT as u8 {
            let x = lane_x(lane) - NOTE_WIDTH / 2.0;
            let color = if !engine.is_pressed(lane) {
                Color::from_rgba(68, 68, 68, 255)
            } else if engine.is_lane_active(lane) {
                GREEN
            } else {
                Color::from_rgba(255, 68, 68, 255)
            };

            draw_rectangle(x, KEY_ROW_Y, NOTE_WIDTH, 30.0, color);
            draw_text(LANE_LABELS[usize::from(lane - 1)], x + 26.0, KEY_ROW_Y + 21.0, 24.0, WHITE);
        }
    }

    fn draw_banner(&mut self, judgment: Judgment) {
        let label = judgment.label();
        let size = measure_text(label, None, 48, 1.0);
        draw_text(
            label,
            (self.width - size.width) / 2.0,
            JUDGE_LINE as f32 - 120.0,
            48.0,
            judgment_color(judgment),
        );
    }

    fn draw_countdown(&mut self, elapsed: f64) {
        let text = format!("Starting in {:.1}", -elapsed / 1000.0);
        let size = measure_text(&text, None, 40, 1.0);
        draw_text(&text, (self.width - size.width) / 2.0, self.height / 3.0, 40.0, WHITE);
    }

    fn draw_ui(&mut self, engine: &JudgmentEngine, hud: &Hud) {
        let stats = engine.stats();

        draw_text(&format!("Score {}", stats.score), 10.0, 24.0, 24.0, WHITE);
        draw_text(&format!("Max combo {}", stats.max_combo), 10.0, 48.0, 20.0, WHITE);

        let connection_color = if hud.connected { GREEN } else { RED };
        draw_rectangle(10.0, 60.0, 8.0, 8.0, connection_color);
        draw_text(hud.name, 22.0, 68.0, 16.0, WHITE);
    }
}
