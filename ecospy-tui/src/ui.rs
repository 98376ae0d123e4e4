use std::time::Instant;

use ecospy_core::{
    classifier::Recyclability,
    model::{Payout, UserRecord},
    session::{Settlement, Stage},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Cell, List, ListItem, Paragraph, Row, Table, Wrap},
};

use crate::app::App;

pub(crate) fn draw(frame: &mut Frame<'_>, app: &App) {
    let area = frame.area();

    // Outer layout: title, main content, status line
    let layout_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(area);

    let chunks = layout_chunks.as_ref();
    let [header_area, content_area, status_area] = chunks else {
        return;
    };

    let header = Paragraph::new("EcoSpy – recycle your items and earn EcoPoints")
        .block(Block::default().borders(Borders::ALL).title("EcoSpy"));
    frame.render_widget(header, *header_area);

    let now = Instant::now();
    match app.stage() {
        Stage::Idle => draw_idle(frame, app, *content_area),
        Stage::Capturing => draw_camera(frame, app, *content_area, now),
        Stage::Reviewing => draw_review(frame, app, *content_area),
        Stage::IdentityEntry => draw_identity_entry(frame, app, *content_area),
        Stage::IdentityConfirmed { user, quote } => {
            draw_identity_confirmed(frame, user, quote, *content_area);
        }
        Stage::PayoutConfirmed(settlement) => {
            draw_result(frame, app, settlement, *content_area, now);
        }
    }

    // Status bar
    let nav_hint = match app.stage() {
        Stage::Idle => "Enter/Space start · q/Ctrl-C quit",
        Stage::Capturing => "p capture · Esc back · q/Ctrl-C quit",
        Stage::Reviewing => "a add items · n/Enter next · c/Esc cancel · q/Ctrl-C quit",
        Stage::IdentityEntry => "Type email or mobile · Enter look up · Esc cancel · Ctrl-C quit",
        Stage::IdentityConfirmed { .. } => {
            "Enter/y add points · n/b not me · Esc cancel · q/Ctrl-C quit"
        }
        Stage::PayoutConfirmed(_) => "Any key to return home",
    };

    let status_text = if app.is_loading {
        format!("Working… · {nav_hint}")
    } else if let Some(msg) = &app.error_message {
        format!("{msg} · {nav_hint}")
    } else {
        nav_hint.to_owned()
    };

    let status_style = if app.error_message.is_some() {
        Style::default().fg(Color::Red)
    } else if app.is_loading {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };

    let status = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("Status"))
        .style(status_style)
        .wrap(Wrap { trim: true });

    frame.render_widget(status, *status_area);
}

fn draw_idle(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let accepted = app.service.classifier().accepted().collect::<Vec<_>>().join(", ");
    let text = vec![
        Line::from("Welcome! Hand in your recyclables and collect EcoPoints.").bold(),
        Line::from(""),
        Line::from(format!("Accepted items: {accepted}")),
        Line::from(""),
        Line::from("Press Enter to start."),
    ];

    let paragraph = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("Welcome"))
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn draw_camera(frame: &mut Frame<'_>, app: &App, area: Rect, now: Instant) {
    let mut text = vec![
        Line::from("Place your items in front of the camera and press p to capture."),
        Line::from(""),
    ];
    if app.session.captures() > 0 {
        text.push(Line::from(format!(
            "{} recyclable item(s) collected so far.",
            app.session.recyclable().total_items()
        )));
    }
    if let Some(secs) = app.seconds_left(now) {
        text.push(Line::from(format!("Camera closes in {secs} s.")).dim());
    }

    let paragraph = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("Camera"))
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn draw_review(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let layout_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(area);

    let chunks = layout_chunks.as_ref();
    let [detected_area, totals_area] = chunks else {
        return;
    };

    let classifier = app.service.classifier();
    let labels = app.session.detected();

    if labels.is_empty() {
        let paragraph = Paragraph::new("No objects detected. Press a to try again.")
            .block(Block::default().borders(Borders::ALL).title("Detected"))
            .wrap(Wrap { trim: true });
        frame.render_widget(paragraph, *detected_area);
    } else {
        let rows = labels.iter().map(|label| {
            let verdict = classifier.classify(label.as_str());
            Row::new(vec![
                Cell::from(label.to_string()),
                Cell::from(verdict.to_string()),
            ])
            .style(Style::default().fg(recyclability_color(verdict)))
        });

        let table = Table::new(rows, [Constraint::Min(16), Constraint::Length(16)])
            .header(
                Row::new(vec!["Item", "Status"])
                    .style(Style::default().add_modifier(Modifier::BOLD)),
            )
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Detected this visit"),
            )
            .column_spacing(1);
        frame.render_widget(table, *detected_area);
    }

    let items = if app.session.recyclable().is_empty() {
        vec![ListItem::new("Nothing recyclable yet.")]
    } else {
        app.session
            .recyclable()
            .iter()
            .map(|(label, count)| ListItem::new(format!("{label} × {count}")))
            .collect()
    };
    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Recyclable this visit"),
    );
    frame.render_widget(list, *totals_area);
}

fn draw_identity_entry(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let layout_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // input
            Constraint::Min(0),    // summary
        ])
        .split(area);

    let chunks = layout_chunks.as_ref();
    let [input_area, summary_area] = chunks else {
        return;
    };

    let input = Paragraph::new(app.identity_input.as_str())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Email or mobile number (Enter)"),
        )
        .wrap(Wrap { trim: true });
    frame.render_widget(input, *input_area);

    let summary = Paragraph::new(format!(
        "{} recyclable item(s) ready to be credited.",
        app.session.recyclable().total_items()
    ))
    .block(Block::default().borders(Borders::ALL).title("Your items"))
    .wrap(Wrap { trim: true });
    frame.render_widget(summary, *summary_area);
}

fn draw_identity_confirmed(frame: &mut Frame<'_>, user: &UserRecord, quote: &Payout, area: Rect) {
    let contact = user
        .email
        .as_deref()
        .or_else(|| user.contact_number())
        .unwrap_or("-");

    let rows = [
        ("Name", user.name.clone()),
        ("Contact", contact.to_owned()),
        ("Current EcoPoints", format!("{:.2}", user.ecopoints)),
        ("Waste type", quote.waste_type.clone()),
        ("Weight", format!("{:.3} kg", quote.total_weight)),
        ("EcoPoints to add", format!("{:.2}", quote.total_payout)),
    ]
    .into_iter()
    .map(|(field, value)| Row::new(vec![Cell::from(field), Cell::from(value)]));

    let table = Table::new(rows, [Constraint::Length(20), Constraint::Min(10)])
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Is this you? (Enter/y to add points, n if not)"),
        )
        .column_spacing(1);
    frame.render_widget(table, area);
}

fn draw_result(frame: &mut Frame<'_>, app: &App, settlement: &Settlement, area: Rect, now: Instant) {
    let mut text = vec![
        Line::from(format!(
            "{:.2} EcoPoints added for {}.",
            settlement.payout.total_payout, settlement.user.name
        ))
        .bold()
        .fg(Color::Green),
        Line::from(format!(
            "New balance: {:.2} EcoPoints",
            settlement.final_ecopoints()
        )),
        Line::from(format!(
            "Total recycled: {:.3} kg",
            settlement.receipt.new_waste_collected
        )),
        Line::from(""),
        Line::from("Thank you for recycling!"),
    ];
    if let Some(secs) = app.seconds_left(now) {
        text.push(Line::from(format!("Returning home in {secs} s.")).dim());
    }

    let paragraph = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("Points added"))
        .wrap(Wrap { trim: true });
    frame.render_widget(paragraph, area);
}

fn recyclability_color(verdict: Recyclability) -> Color {
    match verdict {
        Recyclability::Recyclable => Color::Green,
        Recyclability::NonRecyclable => Color::DarkGray,
    }
}
