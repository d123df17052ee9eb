//! Weedtrack: weed detection on still images and live camera frames.

pub mod module;
use crate::module::define;
use crate::module::device::camera::V4l2Devices;
use crate::module::page::action::{self, Action};
use crate::module::page::{PageController, PageError, PageSettings};
use crate::module::util::init::resource::init;
use crate::module::util::notice::{Notice, Notifier};
use crate::module::util::path::join;
use crate::module::vision::live::LiveSettings;
use crate::module::vision::WeedtrackVision;

use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

pub fn main() {
    let property = match init() {
        Ok(property) => property,
        Err(e) => {
            eprintln!("Failed to initialize: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_log(
        property.path.dir.log.as_str(),
        define::system::NAME,
        &property.conf.system.log_level,
    ) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }
    log::info!("Starting Weedtrack...");

    let vision = match WeedtrackVision::new(&property) {
        Ok(vision) => vision,
        Err(e) => {
            log::error!("Detector unavailable: {}", e);
            eprintln!("Detector unavailable: {}", e);
            std::process::exit(1);
        }
    };

    // Notices are printed as they arrive, including those raised from the live loop.
    let (tx, rx) = mpsc::channel::<Notice>();
    let printer = thread::spawn(move || {
        for notice in rx {
            eprintln!("{}", notice);
        }
    });

    let devices = V4l2Devices::new(property.conf.camera.width, property.conf.camera.height);
    let mut page = PageController::new(
        Arc::new(devices),
        vision.det,
        vision.font,
        LiveSettings::from_conf(&property.conf.live, Some(property.path.img.live.clone())),
        PageSettings::from_conf(&property.conf),
        Notifier::new(tx),
    );

    println!("{}", action::HELP);
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::error!("Can't read input: {}", e);
                break;
            }
        };
        if !dispatch(&mut page, Action::from_line(&line), &property.path.dir.img) {
            break;
        }
        let _ = io::stdout().flush();
    }

    page.stop_live();
    page.stop_camera();
    drop(page);
    let _ = printer.join();
    log::info!("Weedtrack stopped");
}

/// Apply one action to the page. Returns false when the user asked to quit.
fn dispatch(page: &mut PageController, action: Action, img_dir: &str) -> bool {
    let res = match action {
        Action::Open(path) => {
            let res = page.choose_file(&path);
            if let Some(asset) = page.asset() {
                let (w, h) = asset.dimensions();
                println!("{} ({}, {}x{})", asset.name, asset.size, w, h);
            }
            res
        }
        Action::Detect => match page.run() {
            Ok(_) => show_result(page, img_dir),
            Err(e) => Err(e),
        },
        Action::Camera => page
            .open_camera()
            .map(|facing| println!("Camera open ({})", facing)),
        Action::Photo => page.take_photo(),
        Action::Cancel => {
            page.stop_camera();
            Ok(())
        }
        Action::Switch => page
            .switch_camera()
            .map(|facing| println!("Using {} camera", facing)),
        Action::Live => page.start_live(),
        Action::Stop => {
            page.stop_live();
            Ok(())
        }
        Action::Grab => page.capture_live(),
        Action::Fullscreen => page
            .toggle_fullscreen()
            .map(|on| println!("Fullscreen {}", if on { "on" } else { "off" })),
        Action::Reset => {
            page.reset_all();
            Ok(())
        }
        Action::Status => {
            print_status(page);
            Ok(())
        }
        Action::Help => {
            println!("{}", action::HELP);
            Ok(())
        }
        Action::Quit => return false,
        Action::Empty => Ok(()),
        Action::Unknown(line) => {
            println!("Unknown command: {} (try 'help')", line);
            Ok(())
        }
    };

    // Detection and camera failures already went out as notices.
    match res {
        Err(PageError::Validation(_)) => {
            if let Some(msg) = page.error() {
                println!("{}", msg);
            }
        }
        Err(e @ PageError::InvalidState { .. }) | Err(e @ PageError::Encode(_)) => println!("{}", e),
        Err(e) => log::debug!("Action failed: {}", e),
        Ok(()) => {}
    }
    true
}

/// Print the results JSON and write the annotated image next to the other images.
fn show_result(page: &PageController, img_dir: &str) -> Result<(), PageError> {
    if let Some(result) = page.result() {
        println!("{}", result.to_pretty_json());
    }
    if let (Some(asset), Some(annotated)) = (page.asset(), page.annotated()) {
        let stem = asset.name.rsplit_once('.').map_or(asset.name.as_str(), |(s, _)| s);
        let name = format!(
            "{}-annotated-{}.png",
            stem,
            chrono::Local::now().format("%Y%m%d%H%M%S")
        );
        let path = join(&[img_dir, &name]);
        annotated.save(&path)?;
        log::info!("Annotated image saved to {}", path);
        println!("Annotated image: {}", path);
    }
    Ok(())
}

fn print_status(page: &mut PageController) {
    println!("state: {}", page.state());
    match page.asset() {
        Some(asset) => {
            let (w, h) = asset.dimensions();
            println!("image: {} ({}, {}, {}x{})", asset.name, asset.mime, asset.size, w, h);
        }
        None => println!("image: none"),
    }
    if let Some(result) = page.result() {
        println!("detections: {}", result.len());
    }
    if let Some(facing) = page.facing() {
        println!("camera: {}", facing);
    }
    println!("live: {:?}", page.live_phase());
    if page.fullscreen() {
        println!("fullscreen: on");
    }
}

/// Initialize the log4rs file logger at `<dir>/<name>.log`.
///
/// `level` is one of `DEBUG`, `INFO`, `WARN`, `ERROR`; anything else falls back to `INFO`.
fn init_log(dir: &str, name: &str, level: &str) -> Result<(), Box<dyn std::error::Error>> {
    use log::LevelFilter;
    use log4rs::append::file::FileAppender;
    use log4rs::config::{Appender, Config, Root};
    use log4rs::encode::pattern::PatternEncoder;

    let level = level.parse::<LevelFilter>().unwrap_or(LevelFilter::Info);

    let logfile = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new("{h({d} - {l}: {m}{n})}")))
        .build(join(&[dir, &format!("{}.log", name)]))?;

    let config = Config::builder()
        .appender(Appender::builder().build("logfile", Box::new(logfile)))
        .build(Root::builder().appender("logfile").build(level))?;
    log4rs::init_config(config)?;
    Ok(())
}
