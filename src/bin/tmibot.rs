use log::*;
use simplelog::{ColorChoice, Config as LogConfig, TermLogger, TerminalMode};

use tmibot::*;

use std::path::PathBuf;

struct Greeter;

impl Hooks for Greeter {
    fn on_sub(&mut self, out: &Outbox, sub: &Subscription) -> HandlerResult {
        match sub.months {
            1 => out.say(&format!("welcome, {}!", sub.name)),
            n => out.say(&format!("{} months, {}! thanks", n, sub.name)),
        }
        Ok(())
    }

    fn on_follow(&mut self, out: &Outbox, follower: &Follower) -> HandlerResult {
        out.say(&format!("thanks for the follow, {}", follower.display_name));
        Ok(())
    }

    fn on_mode_change(&mut self, _: &Outbox, change: &ModeChange) -> HandlerResult {
        info!("{:?} mode is now {}", change.mode, if change.on { "on" } else { "off" });
        Ok(())
    }
}

fn commands() -> Result<Commands, Error> {
    let commands = Commands::builder()
        .command("!zz", Permission::MODERATOR | Permission::BROADCASTER, |out, req| {
            out.reply(req.sender(), "going to sleep");
            Ok(())
        })
        .command("!version", Permission::NONE, |out, _| {
            let rev = option_env!("TMIBOT_GIT_REV").unwrap_or("unknown");
            out.say(&format!("tmibot {} ({})", env!("CARGO_PKG_VERSION"), rev));
            Ok(())
        })
        .pattern(r"(\d{3})-(\d{3})-(\d{4})", Permission::NONE, |out, matches| {
            let numbers = matches.matched().collect::<Vec<_>>().join(", ");
            out.reply(matches.sender(), &format!("please don't post phone numbers: {}", numbers));
            Ok(())
        })?
        .build();
    Ok(commands)
}

fn run() -> Result<(), Error> {
    let path = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => match Config::default_path() {
            Some(path) => path,
            None => {
                error!("cannot find a config directory. pass a path to a config file");
                std::process::exit(1);
            }
        },
    };

    let config = Config::load(&path)?;
    info!("connecting to {}:{} as {}", config.address, config.port, config.nick);

    let bot = Bot::connect(&config, commands()?, Greeter)?;
    bot.run()
}

fn main() {
    TermLogger::init(
        util::get_log_level("TMIBOT_LOG"),
        LogConfig::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .expect("initialize logger");

    if let Some(rev) = option_env!("TMIBOT_GIT_REV") {
        debug!("tmibot {}", rev);
    }

    if let Err(err) = run() {
        error!("{}", err);
        std::process::exit(1);
    }
}
