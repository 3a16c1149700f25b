//! ## Printing Module
//!
//! Renders the [GlobalState] as a table for the `--print-state` status thread.
//! Hall calls are listed per floor, every car gets one row.

use ansi_term::Colour::{Green, Purple, Red, Yellow};
use prettytable::{color, format, Attr, Cell, Row, Table};

use crate::elevio::{Bounds, ButtonType, Direction};
use crate::utils::floor_set::FloorSet;
use crate::world_view::{ElevatorState, GlobalState};

fn floors_text(set: &FloorSet, bounds: &Bounds) -> String {
    let floors: Vec<String> = set.iter(bounds).map(|f| f.to_string()).collect();
    if floors.is_empty() {
        "-".to_string()
    } else {
        floors.join(",")
    }
}

fn header(titles: &[&str]) -> Row {
    Row::new(
        titles
            .iter()
            .map(|t| Cell::new(t).with_style(Attr::Bold).with_style(Attr::ForegroundColor(color::BRIGHT_BLUE)))
            .collect(),
    )
}

fn status_text(state: &ElevatorState) -> String {
    if state.stopped {
        return Red.paint("Stopped").to_string();
    }
    if state.door_open {
        return Purple.paint("Door Open").to_string();
    }
    match state.direction {
        Direction::Up => Yellow.paint("Moving up").to_string(),
        Direction::Down => Yellow.paint("Moving down").to_string(),
        Direction::None => Green.paint("Idle").to_string(),
    }
}

fn hall_call(set: &FloorSet, floor: i32, bounds: &Bounds, button_type: ButtonType) -> String {
    if !bounds.has_button(button_type, floor) {
        return " ".to_string();
    }
    match set.get(floor, bounds) {
        Ok(true) => Green.paint("●").to_string(),
        _ => Red.paint("○").to_string(),
    }
}

/// Builds the hall call table and the car table of `global_state`.
pub fn tables(global_state: &GlobalState, bounds: &Bounds) -> (Table, Table) {
    let mut halls = Table::new();
    halls.set_format(*format::consts::FORMAT_CLEAN);
    halls.add_row(header(&["Floor", "Down", "Up"]));
    let (up, down) = (global_state.up_buttons(), global_state.down_buttons());
    for floor in bounds.floors().rev() {
        halls.add_row(Row::new(vec![
            Cell::new(&floor.to_string()),
            Cell::new(&hall_call(&down, floor, bounds, ButtonType::DOWN)),
            Cell::new(&hall_call(&up, floor, bounds, ButtonType::UP)),
        ]));
    }

    let mut cars = Table::new();
    cars.set_format(*format::consts::FORMAT_BOX_CHARS);
    cars.add_row(header(&["ID", "Floor", "Status", "Inside", "Up", "Down", "Age"]));
    for (state, age) in global_state.elevators_with_age() {
        cars.add_row(Row::new(vec![
            Cell::new(&Yellow.bold().paint(state.id.to_string()).to_string()),
            Cell::new(&state.last_floor.to_string()),
            Cell::new(&status_text(&state)),
            Cell::new(&floors_text(&state.inside_buttons, bounds)),
            Cell::new(&floors_text(&state.up_buttons, bounds)),
            Cell::new(&floors_text(&state.down_buttons, bounds)),
            Cell::new(&format!("{} ms", age.as_millis())),
        ]));
    }
    (halls, cars)
}

/// Prints the global state to stdout.
pub fn global_state(global_state: &GlobalState, bounds: &Bounds) {
    let (halls, cars) = tables(global_state, bounds);
    println!("{}", Purple.bold().paint("GLOBAL STATE"));
    halls.printstd();
    cars.printstd();
}
