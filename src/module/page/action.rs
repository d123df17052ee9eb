//! User actions, one per page control.

/// Page Action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Choose File
    Open(String),
    /// Detect Weeds
    Detect,
    /// Capture with Camera
    Camera,
    /// Take Photo
    Photo,
    Cancel,
    Switch,
    /// Start Live Detection
    Live,
    /// Stop Live Detection
    Stop,
    /// Capture Detection Image
    Grab,
    Fullscreen,
    Reset,
    Status,
    Help,
    Quit,
    /// Nothing was typed.
    Empty,
    Unknown(String),
}

impl Action {
    /// Parse one input line. Keywords are case-insensitive; `open` takes the rest of the
    /// line as its path so names with spaces survive.
    pub fn from_line(line: &str) -> Action {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        match word.to_lowercase().as_str() {
            "" => Action::Empty,
            "open" if !rest.is_empty() => Action::Open(rest.to_owned()),
            "detect" | "run" => Action::Detect,
            "camera" => Action::Camera,
            "photo" => Action::Photo,
            "cancel" => Action::Cancel,
            "switch" => Action::Switch,
            "live" => Action::Live,
            "stop" => Action::Stop,
            "grab" => Action::Grab,
            "fullscreen" | "fs" => Action::Fullscreen,
            "reset" => Action::Reset,
            "status" => Action::Status,
            "help" | "?" => Action::Help,
            "quit" | "exit" => Action::Quit,
            _ => Action::Unknown(line.to_owned()),
        }
    }
}

pub const HELP: &str = "\
open <path>  choose an image file
detect       detect weeds in the loaded image
camera       open the camera for a still photo
photo        take a photo with the open camera
cancel       close the camera
switch       switch between front and rear camera
live         start live detection
stop         stop live detection
grab         keep the current live frame for detection
fullscreen   toggle fullscreen live view
reset        forget the image and results
status       show the page state
help         show this help
quit         exit";
