//! Operator console
//!
//! A line-oriented stand-in for the desktop UI. Each input line is one
//! command; replies and rig events are printed as text.

use pultrusion_communication::{Rig, ShutdownState, TemperatureRequest, TemperatureState};
use pultrusion_core::{Actuator, ControlError, ControlEvent, Error, RigEvent};
use std::str::FromStr;
use thiserror::Error;

/// Help text printed by `help`
pub const HELP: &str = "\
Commands:
  fan <0-100>          set fan speed (debounced)
  winder <0-100>       set winder speed (debounced)
  fan apply            send the fan speed now
  winder apply         send the winder speed now
  temp <celsius>       request a heater temperature
  shutdown <minutes>   start the shutdown countdown
  cancel               cancel the countdown
  eject                trigger ejection
  preset <name>        apply a filament preset
  on|off fan|winder    switch an output on or off
  status               show the latest readings
  help                 show this text
  quit                 disconnect and exit";

/// A parsed console line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Move a speed slider
    Speed {
        /// Which actuator
        actuator: Actuator,
        /// Slider value
        value: u32,
    },
    /// Send a slider value immediately
    ApplySpeed(Actuator),
    /// Request a temperature
    Temperature(i32),
    /// Start the shutdown countdown
    Shutdown(u32),
    /// Cancel the countdown
    Cancel,
    /// Eject
    Eject,
    /// Apply a preset by name
    Preset(String),
    /// Switch an output on or off
    Power {
        /// Which actuator
        actuator: Actuator,
        /// On or off
        on: bool,
    },
    /// Show the latest readings
    Status,
    /// Show help
    Help,
    /// Leave the console
    Quit,
}

/// Console input errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsoleError {
    /// Blank input line
    #[error("Empty command")]
    Empty,

    /// First word is not a command
    #[error("Unknown command '{0}', type 'help' for a list")]
    UnknownCommand(String),

    /// A required argument is missing
    #[error("'{command}' needs an argument: {expected}")]
    MissingArgument {
        /// The command word.
        command: String,
        /// What should follow it.
        expected: String,
    },

    /// An argument is not a valid number
    #[error("'{value}' is not a valid number")]
    InvalidNumber {
        /// The rejected argument.
        value: String,
    },

    /// `on`/`off` named something other than fan or winder
    #[error("Unknown output '{0}', expected fan or winder")]
    UnknownActuator(String),
}

fn number<T: FromStr>(value: &str) -> Result<T, ConsoleError> {
    value.parse().map_err(|_| ConsoleError::InvalidNumber {
        value: value.to_string(),
    })
}

fn missing(command: &str, expected: &str) -> ConsoleError {
    ConsoleError::MissingArgument {
        command: command.to_string(),
        expected: expected.to_string(),
    }
}

impl FromStr for ConsoleCommand {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Err(ConsoleError::Empty);
        };
        let command = word.to_ascii_lowercase();
        let argument = words.next();

        match command.as_str() {
            "fan" | "winder" | "spool" => {
                let actuator = command
                    .parse::<Actuator>()
                    .map_err(|_| ConsoleError::UnknownActuator(command.clone()))?;
                match argument {
                    Some(arg) if arg.eq_ignore_ascii_case("apply") => {
                        Ok(ConsoleCommand::ApplySpeed(actuator))
                    }
                    Some(arg) => Ok(ConsoleCommand::Speed {
                        actuator,
                        value: number(arg)?,
                    }),
                    None => Err(missing(&command, "0-100 or apply")),
                }
            }
            "temp" | "temperature" => argument
                .map(number)
                .transpose()?
                .map(ConsoleCommand::Temperature)
                .ok_or_else(|| missing(&command, "temperature in °C")),
            "shutdown" => argument
                .map(number)
                .transpose()?
                .map(ConsoleCommand::Shutdown)
                .ok_or_else(|| missing(&command, "minutes")),
            "preset" => {
                let name: Vec<&str> = argument.into_iter().chain(words).collect();
                if name.is_empty() {
                    return Err(missing(&command, "preset name"));
                }
                Ok(ConsoleCommand::Preset(name.join(" ")))
            }
            "on" | "off" => {
                let arg = argument.ok_or_else(|| missing(&command, "fan or winder"))?;
                let actuator = arg
                    .parse::<Actuator>()
                    .map_err(|_| ConsoleError::UnknownActuator(arg.to_string()))?;
                Ok(ConsoleCommand::Power {
                    actuator,
                    on: command == "on",
                })
            }
            "cancel" => Ok(ConsoleCommand::Cancel),
            "eject" => Ok(ConsoleCommand::Eject),
            "status" => Ok(ConsoleCommand::Status),
            "help" | "?" => Ok(ConsoleCommand::Help),
            "quit" | "exit" => Ok(ConsoleCommand::Quit),
            _ => Err(ConsoleError::UnknownCommand(word.to_string())),
        }
    }
}

/// Run one command against the rig and return the reply text.
///
/// `Quit` is handled by the caller and yields an empty reply here.
pub fn execute(rig: &Rig, command: ConsoleCommand) -> Result<String, ControlError> {
    let reply = match command {
        ConsoleCommand::Speed { actuator, value } => {
            match actuator {
                Actuator::Fan => rig.submit_fan_speed(value)?,
                Actuator::Winder => rig.submit_winder_speed(value)?,
            }
            format!("{} speed set to {}%", actuator, value)
        }
        ConsoleCommand::ApplySpeed(actuator) => {
            let pwm = match actuator {
                Actuator::Fan => rig.apply_fan_speed()?,
                Actuator::Winder => rig.apply_winder_speed()?,
            };
            format!("{} speed applied (PWM {})", actuator, pwm)
        }
        ConsoleCommand::Temperature(value) => match rig.request_temperature(value)? {
            TemperatureRequest::Sent(_) => format!("Temperature {}°C requested", value),
            TemperatureRequest::AlreadySet => {
                format!("Desired temperature {}°C is already set", value)
            }
        },
        ConsoleCommand::Shutdown(minutes) => {
            rig.start_shutdown(minutes)?;
            format!("Timer started for {} minute(s)", minutes)
        }
        ConsoleCommand::Cancel => {
            if rig.cancel_shutdown() {
                "Shutdown timer cancelled".to_string()
            } else {
                "No shutdown timer is running".to_string()
            }
        }
        ConsoleCommand::Eject => {
            rig.eject()?;
            "Eject command sent".to_string()
        }
        ConsoleCommand::Preset(name) => {
            let outcome = rig.apply_preset(&name)?;
            let preset = &outcome.preset;
            let reply = format!(
                "{} preset: {}°C, fan {}%, winder {}%",
                preset.name, preset.temperature, preset.fan_speed, preset.spool_speed
            );
            match outcome.temperature {
                Ok(_) => reply,
                Err(e) => format!("{} (temperature not sent: {})", reply, e),
            }
        }
        ConsoleCommand::Power { actuator, on } => {
            rig.set_actuator_power(actuator, on)?;
            format!("{} turned {}", actuator, if on { "on" } else { "off" })
        }
        ConsoleCommand::Status => status_report(rig),
        ConsoleCommand::Help => HELP.to_string(),
        ConsoleCommand::Quit => String::new(),
    };
    Ok(reply)
}

/// Sort a failed command into what the operator sees.
///
/// Fatal errors come back as `Err` and end the console. Link failures are
/// logged, since the dispatcher already published them, and yield `None`.
/// Anything else is a message for the operator.
pub fn report(error: ControlError) -> Result<Option<String>, Error> {
    let error = Error::from(error);
    if error.is_fatal() {
        tracing::error!("{}", error);
        return Err(error);
    }
    if error.is_link_error() {
        tracing::warn!("{}", error);
        return Ok(None);
    }
    Ok(Some(error.to_string()))
}

/// Multi-line summary of the rig state
pub fn status_report(rig: &Rig) -> String {
    let readings = match rig.latest_status() {
        Some(status) => status.to_string(),
        None => "No telemetry received yet".to_string(),
    };
    let temperature = match rig.temperature_state() {
        TemperatureState::Idle => format!("Desired: {}°C", rig.desired_temperature()),
        TemperatureState::AwaitingAck(pending) => {
            format!("Desired: {}°C (awaiting confirmation)", pending.expected_temp)
        }
    };
    let countdown = match rig.shutdown_state() {
        ShutdownState::Idle => "No shutdown timer".to_string(),
        ShutdownState::Running { remaining_seconds } => format!(
            "Shutdown in {:02}:{:02}",
            remaining_seconds / 60,
            remaining_seconds % 60
        ),
    };
    format!(
        "{}\n{} | Fan: {}% | Winder: {}%\n{}",
        readings,
        temperature,
        rig.fan_speed(),
        rig.winder_speed(),
        countdown
    )
}

/// Text for an event worth showing to the operator
pub fn event_line(event: &RigEvent) -> Option<String> {
    match event {
        // Countdown: every full minute, then the last ten seconds
        RigEvent::Control(ControlEvent::ShutdownTick { remaining_seconds })
            if *remaining_seconds % 60 != 0 && *remaining_seconds > 10 =>
        {
            None
        }
        RigEvent::Control(ControlEvent::SpeedCommitted { .. }) => None,
        _ => Some(event.description()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pultrusion_communication::{memory_link, DeviceEnd, RigDefaults, RigTimings};
    use pultrusion_core::LinkError;
    use std::time::Duration;

    fn rig() -> (Rig, DeviceEnd) {
        let (link, device) = memory_link("console");
        let rig = Rig::with_link(link, RigTimings::default(), RigDefaults::default());
        (rig, device)
    }

    fn run(rig: &Rig, line: &str) -> Result<String, ControlError> {
        execute(rig, line.parse().unwrap())
    }

    #[test]
    fn test_parse_speed_commands() {
        assert_eq!(
            "fan 40".parse(),
            Ok(ConsoleCommand::Speed {
                actuator: Actuator::Fan,
                value: 40
            })
        );
        assert_eq!(
            "Winder apply".parse(),
            Ok(ConsoleCommand::ApplySpeed(Actuator::Winder))
        );
        assert_eq!(
            "fan".parse::<ConsoleCommand>(),
            Err(ConsoleError::MissingArgument {
                command: "fan".to_string(),
                expected: "0-100 or apply".to_string()
            })
        );
        assert_eq!(
            "fan fast".parse::<ConsoleCommand>(),
            Err(ConsoleError::InvalidNumber {
                value: "fast".to_string()
            })
        );
    }

    #[test]
    fn test_parse_temperature_and_timer() {
        assert_eq!("temp 190".parse(), Ok(ConsoleCommand::Temperature(190)));
        assert_eq!("shutdown 10".parse(), Ok(ConsoleCommand::Shutdown(10)));
        assert!("shutdown -1".parse::<ConsoleCommand>().is_err());
        assert!("temp".parse::<ConsoleCommand>().is_err());
    }

    #[test]
    fn test_parse_power_and_preset() {
        assert_eq!(
            "off winder".parse(),
            Ok(ConsoleCommand::Power {
                actuator: Actuator::Winder,
                on: false
            })
        );
        assert_eq!(
            "on pump".parse::<ConsoleCommand>(),
            Err(ConsoleError::UnknownActuator("pump".to_string()))
        );
        assert_eq!(
            "preset PETG".parse(),
            Ok(ConsoleCommand::Preset("PETG".to_string()))
        );
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!("".parse::<ConsoleCommand>(), Err(ConsoleError::Empty));
        assert_eq!("  quit ".parse(), Ok(ConsoleCommand::Quit));
        assert_eq!(
            "jog x10".parse::<ConsoleCommand>(),
            Err(ConsoleError::UnknownCommand("jog".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_speed_commands_reach_the_link() {
        let (rig, device) = rig();

        assert_eq!(run(&rig, "fan 30").unwrap(), "fan speed set to 30%");
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(device.take_lines(), vec!["SET_FAN_PWM:179"]);

        assert_eq!(
            run(&rig, "winder apply").unwrap(),
            "winder speed applied (PWM 128)"
        );
        assert_eq!(device.take_lines(), vec!["SET_WINDER_PWM:128"]);

        assert!(matches!(
            run(&rig, "fan 101"),
            Err(ControlError::InvalidSpeed { value: 101 })
        ));

        rig.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_temperature_and_duplicate() {
        let (rig, device) = rig();

        assert_eq!(run(&rig, "temp 200").unwrap(), "Temperature 200°C requested");
        assert!(matches!(
            run(&rig, "temp 210"),
            Err(ControlError::TemperatureBusy { pending: 200 })
        ));
        assert_eq!(
            run(&rig, "temp 200").unwrap(),
            "Desired temperature 200°C is already set"
        );
        assert_eq!(device.take_lines(), vec!["SET_TEMP:200"]);

        let report = status_report(&rig);
        assert!(report.contains("No telemetry received yet"));
        assert!(report.contains("awaiting confirmation"));

        rig.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_cancel_and_bare_commands() {
        let (rig, device) = rig();

        assert_eq!(
            run(&rig, "shutdown 2").unwrap(),
            "Timer started for 2 minute(s)"
        );
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(status_report(&rig).contains("Shutdown in 01:59"));

        assert_eq!(run(&rig, "cancel").unwrap(), "Shutdown timer cancelled");
        assert_eq!(run(&rig, "cancel").unwrap(), "No shutdown timer is running");

        run(&rig, "eject").unwrap();
        run(&rig, "off fan").unwrap();
        assert_eq!(
            device.take_lines(),
            vec!["SET_SHUTDOWN_TIME:120", "EJECT", "FAN_OFF"]
        );

        rig.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_preset_by_name() {
        let (rig, device) = rig();

        assert_eq!(
            run(&rig, "preset petg").unwrap(),
            "PETG preset: 250°C, fan 50%, winder 60%"
        );
        assert_eq!(
            device.take_lines(),
            vec!["SET_TEMP:250", "SET_FAN_PWM:128", "SET_WINDER_PWM:103"]
        );
        assert!(matches!(
            run(&rig, "preset TPU"),
            Err(ControlError::UnknownPreset { .. })
        ));

        rig.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_preset_while_temperature_pending_still_sets_speeds() {
        let (rig, device) = rig();

        run(&rig, "temp 150").unwrap();
        assert_eq!(
            run(&rig, "preset PLA").unwrap(),
            "PLA preset: 190°C, fan 60%, winder 70% (temperature not sent: \
             Temperature request for 150 is still awaiting acknowledgment)"
        );
        assert_eq!(
            device.take_lines(),
            vec!["SET_TEMP:150", "SET_FAN_PWM:103", "SET_WINDER_PWM:77"]
        );

        rig.shutdown().await;
    }

    #[test]
    fn test_report_sorts_errors() {
        assert_eq!(
            report(ControlError::InvalidDuration { minutes: 0 }).unwrap(),
            Some("Invalid shutdown duration: 0 minute(s)".to_string())
        );
        assert_eq!(
            report(ControlError::Link(LinkError::WriteFailed {
                reason: "broken pipe".to_string()
            }))
            .unwrap(),
            None
        );

        let fatal = report(ControlError::Link(LinkError::Unavailable {
            port: "COM3".to_string(),
            reason: "gone".to_string(),
        }))
        .unwrap_err();
        assert!(fatal.is_fatal());
    }

    #[test]
    fn test_event_line_filters_countdown_noise() {
        let tick = |remaining_seconds| {
            event_line(&RigEvent::Control(ControlEvent::ShutdownTick {
                remaining_seconds,
            }))
        };
        assert_eq!(tick(120).as_deref(), Some("Time remaining: 02:00"));
        assert!(tick(95).is_none());
        assert_eq!(tick(7).as_deref(), Some("Time remaining: 00:07"));
    }
}
