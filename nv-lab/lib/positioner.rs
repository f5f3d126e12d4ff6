//! Session logic for a three-axis ANC350 piezo positioner.
//!
//! The hardware itself is accessed through the [`Positioner`] trait, so that
//! the same [`Controller`] drives either a real device binding or the
//! in-memory [`VirtualPositioner`]. Device positions are in nanometers; step
//! sizes and displayed positions are in micrometers.

use std::fmt;
use indexmap::IndexMap;
use regex::Regex;
use crate::error::{ Error, Result };

/// One of the three positioner axes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
}

impl Axis {
    /// All axes in index order.
    pub fn all() -> [Self; 3] { [Self::X, Self::Y, Self::Z] }

    /// Device index of the axis.
    pub fn index(self) -> usize { self as usize }

    /// Look up an axis by device index.
    pub fn from_index(index: usize) -> Result<Self> {
        match index {
            0 => Ok(Self::X),
            1 => Ok(Self::Y),
            2 => Ok(Self::Z),
            _ => Err(Error::InvalidAxis(index)),
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "x" => Some(Self::X),
            "y" => Some(Self::Y),
            "z" => Some(Self::Z),
            _ => None,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X => write!(f, "X"),
            Self::Y => write!(f, "Y"),
            Self::Z => write!(f, "Z"),
        }
    }
}

/// Direction of a single step.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Plus,
    Minus,
}

impl Direction {
    pub fn sign(self) -> i64 {
        match self {
            Self::Plus => 1,
            Self::Minus => -1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plus => write!(f, "+"),
            Self::Minus => write!(f, "-"),
        }
    }
}

/// Capabilities of a connected positioner controller.
pub trait Positioner {
    /// Number of connected devices.
    fn num_connected(&self) -> usize;

    /// Identifier of the connected device, if any.
    fn device_id(&self) -> Option<i64>;

    /// Current position of an axis (nm).
    fn get_position(&mut self, axis: Axis) -> Result<i64>;

    /// Enable or disable the output of an axis.
    fn set_output(&mut self, axis: Axis, enabled: bool) -> Result<()>;

    /// Move an axis to an absolute position (nm).
    fn move_absolute(&mut self, axis: Axis, target: i64) -> Result<()>;

    /// Release the device.
    fn close(&mut self) -> Result<()>;
}

/// A call made on a [`VirtualPositioner`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeviceCall {
    GetPosition(Axis),
    SetOutput(Axis, bool),
    MoveAbsolute(Axis, i64),
    Close,
}

/// In-memory stand-in for a positioner, recording every call made on it.
///
/// Moves are applied instantly and require the axis output to be enabled.
#[derive(Clone, Debug, PartialEq)]
pub struct VirtualPositioner {
    id: Option<i64>,
    positions: [i64; 3],
    outputs: [bool; 3],
    closed: bool,
    log: Vec<DeviceCall>,
    faults: Vec<DeviceCall>,
}

impl VirtualPositioner {
    /// Create a connected device with the given identifier and starting
    /// positions (nm).
    pub fn new(id: i64, positions: [i64; 3]) -> Self {
        Self {
            id: Some(id),
            positions,
            outputs: [false; 3],
            closed: false,
            log: Vec::new(),
            faults: Vec::new(),
        }
    }

    /// Create a device that reports no connection.
    pub fn disconnected() -> Self {
        Self {
            id: None,
            positions: [0; 3],
            outputs: [false; 3],
            closed: false,
            log: Vec::new(),
            faults: Vec::new(),
        }
    }

    /// Make every later call like `call` fail with a device error. Moves
    /// match on the axis alone, whatever their target.
    pub fn fail_on(mut self, call: DeviceCall) -> Self {
        self.faults.push(call);
        self
    }

    /// True positions of all three axes (nm).
    pub fn positions(&self) -> [i64; 3] { self.positions }

    /// Output states of all three axes.
    pub fn outputs(&self) -> [bool; 3] { self.outputs }

    /// Whether [`Positioner::close`] has been called.
    pub fn is_closed(&self) -> bool { self.closed }

    /// Every call made so far, in order.
    pub fn log(&self) -> &[DeviceCall] { &self.log }

    fn record(&mut self, call: DeviceCall) -> Result<()> {
        self.log.push(call);
        let faulted
            = self.faults.iter().any(|fault| {
                match (fault, &call) {
                    (DeviceCall::MoveAbsolute(a, _), DeviceCall::MoveAbsolute(b, _))
                        => a == b,
                    _ => *fault == call,
                }
            });
        if faulted {
            return Err(Error::Device(format!("injected fault on {:?}", call)));
        }
        self.check_available()
    }

    fn check_available(&self) -> Result<()> {
        if self.id.is_none() {
            Err(Error::Device("no positioner connected".into()))
        } else if self.closed {
            Err(Error::Device("connection already closed".into()))
        } else {
            Ok(())
        }
    }
}

impl Positioner for VirtualPositioner {
    fn num_connected(&self) -> usize { self.id.map_or(0, |_| 1) }

    fn device_id(&self) -> Option<i64> { self.id }

    fn get_position(&mut self, axis: Axis) -> Result<i64> {
        self.record(DeviceCall::GetPosition(axis))?;
        Ok(self.positions[axis.index()])
    }

    fn set_output(&mut self, axis: Axis, enabled: bool) -> Result<()> {
        self.record(DeviceCall::SetOutput(axis, enabled))?;
        self.outputs[axis.index()] = enabled;
        Ok(())
    }

    fn move_absolute(&mut self, axis: Axis, target: i64) -> Result<()> {
        self.record(DeviceCall::MoveAbsolute(axis, target))?;
        if !self.outputs[axis.index()] {
            return Err(Error::Device(format!("output of axis {} is disabled", axis)));
        }
        self.positions[axis.index()] = target;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.record(DeviceCall::Close)?;
        self.closed = true;
        Ok(())
    }
}

/// Default step size text for each axis (μm).
pub const DEFAULT_STEP: &str = "1";

/// Largest accepted step size (nm), well beyond the travel of any stage.
pub const MAX_STEP_NM: i64 = 1_000_000_000;

/// Parse step-size text in micrometers to an integer number of nanometers,
/// truncating toward zero.
///
/// Fails on non-numeric text or if the step exceeds [`MAX_STEP_NM`] in
/// magnitude.
pub fn parse_step(text: &str) -> Result<i64> {
    let um: f64 = text.trim().parse()
        .map_err(|_| Error::InvalidStepSize(text.to_string()))?;
    let nm = (um * 1e3).trunc();
    if !nm.is_finite() || nm.abs() > MAX_STEP_NM as f64 {
        return Err(Error::InvalidStepSize(text.to_string()));
    }
    Ok(nm as i64)
}

/// A positioner session: cached positions and per-axis step sizes.
///
/// The device's outputs are disabled and the connection closed when the
/// controller is shut down or dropped.
#[derive(Debug)]
pub struct Controller<P>
where P: Positioner
{
    device: P,
    positions: [i64; 3],
    steps: [String; 3],
    closed: bool,
}

impl<P> Controller<P>
where P: Positioner
{
    /// Start a session, reading all three positions if a device is connected.
    pub fn new(mut device: P) -> Result<Self> {
        let mut positions = [0; 3];
        if device.num_connected() > 0 {
            for axis in Axis::all() {
                positions[axis.index()] = device.get_position(axis)?;
            }
        }
        Ok(Self {
            device,
            positions,
            steps: [DEFAULT_STEP, DEFAULT_STEP, DEFAULT_STEP].map(String::from),
            closed: false,
        })
    }

    /// Connection status line.
    pub fn status(&self) -> String {
        match self.device.device_id() {
            Some(id) if self.device.num_connected() > 0
                => format!("{} Connected", id),
            _ => "Disconnected".to_string(),
        }
    }

    /// Underlying device.
    pub fn device(&self) -> &P { &self.device }

    /// Cached positions of all three axes (nm).
    pub fn positions(&self) -> [i64; 3] { self.positions }

    /// Refresh all three cached positions from the device.
    pub fn read(&mut self) -> Result<[i64; 3]> {
        for axis in Axis::all() {
            self.positions[axis.index()] = self.device.get_position(axis)?;
        }
        Ok(self.positions)
    }

    /// Replace the step-size text of an axis. The text is only validated when
    /// a step is taken.
    pub fn set_step_text(&mut self, axis: Axis, text: &str) {
        self.steps[axis.index()] = text.to_string();
    }

    /// Current step-size text of an axis (μm).
    pub fn step_text(&self, axis: Axis) -> &str { &self.steps[axis.index()] }

    /// Step size of an axis (nm).
    pub fn step_nm(&self, axis: Axis) -> Result<i64> {
        parse_step(&self.steps[axis.index()])
    }

    /// Take one step along `axis`, enabling only that axis' output, and
    /// return the new target position (nm).
    ///
    /// If the cached position is zero it is first refreshed from the device.
    /// The cached position only changes once the device accepts the move.
    pub fn move_axis(&mut self, axis: Axis, dir: Direction) -> Result<i64> {
        let step = self.step_nm(axis)?;
        self.device.set_output(axis, true)?;
        for other in Axis::all().into_iter().filter(|ax| *ax != axis) {
            self.device.set_output(other, false)?;
        }
        let k = axis.index();
        if self.positions[k] == 0 {
            self.positions[k] = self.device.get_position(axis)?;
        }
        let target = self.positions[k].checked_add(dir.sign() * step)
            .ok_or_else(|| Error::InvalidInput(format!(
                "stepping axis {} by {} nm from {} nm overflows",
                axis, dir.sign() * step, self.positions[k],
            )))?;
        self.device.move_absolute(axis, target)?;
        self.positions[k] = target;
        Ok(target)
    }

    /// Cached position of an axis formatted in micrometers.
    pub fn position_text(&self, axis: Axis) -> String {
        format!("{}", self.positions[axis.index()] as f64 / 1e3)
    }

    /// Disable all outputs and close the device, attempting every call even
    /// if an earlier one fails, and return the first error. Calling this more
    /// than once has no further effect.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.closed { return Ok(()); }
        let mut first_err: Option<Error> = None;
        for axis in Axis::all() {
            if let Err(err) = self.device.set_output(axis, false) {
                first_err.get_or_insert(err);
            }
        }
        if let Err(err) = self.device.close() {
            first_err.get_or_insert(err);
        }
        self.closed = true;
        first_err.map_or(Ok(()), Err)
    }
}

impl<P> Drop for Controller<P>
where P: Positioner
{
    fn drop(&mut self) {
        self.shutdown().ok();
    }
}

/// An action requested from the terminal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Move(Axis, Direction),
    Read,
    Focus,
    SetStep(Axis, String),
    Help,
    Quit,
}

/// Ordered key-name bindings plus the patterns for typed commands.
///
/// Key names are matched without regard to case.
#[derive(Clone, Debug)]
pub struct KeyMap {
    // lowercase key -> (display name, command)
    keys: IndexMap<String, (String, Command)>,
    button: Regex,
    step: Regex,
}

impl KeyMap {
    /// Create the default bindings.
    pub fn new() -> Result<Self> {
        use Axis::*;
        use Direction::*;
        let mut keymap = Self {
            keys: IndexMap::new(),
            button: Regex::new(r"^(?i)([xyz])\s*([+-])$")?,
            step: Regex::new(r"^(?i)step\s+([xyz])\s+(\S+)$")?,
        };
        let bindings = [
            ("Next",   Command::Move(X, Plus)),
            ("Delete", Command::Move(X, Minus)),
            ("Home",   Command::Move(Y, Plus)),
            ("End",    Command::Move(Y, Minus)),
            ("F2",     Command::Move(Z, Plus)),
            ("F1",     Command::Move(Z, Minus)),
            ("Escape", Command::Focus),
            ("Return", Command::Read),
        ];
        for (key, command) in bindings.into_iter() {
            keymap.bind(key, command);
        }
        Ok(keymap)
    }

    /// Look up a key name.
    pub fn get(&self, key: &str) -> Option<&Command> {
        self.keys.get(&key.to_lowercase()).map(|(_, c)| c)
    }

    /// Bind a key name to a command, replacing any existing binding for the
    /// same key in place.
    pub fn bind(&mut self, key: &str, command: Command) {
        self.keys.insert(key.to_lowercase(), (key.to_string(), command));
    }

    /// Number of bound keys.
    pub fn len(&self) -> usize { self.keys.len() }

    pub fn is_empty(&self) -> bool { self.keys.is_empty() }

    /// Iterate over all bindings in order, by display name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Command)> + '_ {
        self.keys.values().map(|(name, c)| (name.as_str(), c))
    }

    /// Parse one line of terminal input.
    ///
    /// Accepts a bound key name, a button like `x+` or `Z-`, `read`,
    /// `step <axis> <μm>`, `help`, or `quit`.
    pub fn parse(&self, line: &str) -> Result<Command> {
        let line = line.trim();
        if let Some(command) = self.get(line) {
            return Ok(command.clone());
        }
        if let Some(cap) = self.button.captures(line) {
            let axis = Axis::from_label(&cap[1])
                .ok_or_else(|| Error::InvalidInput(line.to_string()))?;
            let dir = if &cap[2] == "+" { Direction::Plus } else { Direction::Minus };
            return Ok(Command::Move(axis, dir));
        }
        if let Some(cap) = self.step.captures(line) {
            let axis = Axis::from_label(&cap[1])
                .ok_or_else(|| Error::InvalidInput(line.to_string()))?;
            return Ok(Command::SetStep(axis, cap[2].to_string()));
        }
        match line.to_ascii_lowercase().as_str() {
            "read" => Ok(Command::Read),
            "help" | "?" => Ok(Command::Help),
            "quit" | "exit" | "q" => Ok(Command::Quit),
            _ => Err(Error::InvalidInput(format!("unknown command '{}'", line))),
        }
    }
}

/// Parse one line of terminal input with the default key bindings.
pub fn parse_command(line: &str) -> Result<Command> {
    KeyMap::new()?.parse(line)
}

#[cfg(test)]
mod test {
    use super::*;

    fn controller() -> Controller<VirtualPositioner> {
        Controller::new(VirtualPositioner::new(1234, [5000, -2000, 0])).unwrap()
    }

    #[test]
    fn connection_status() {
        assert_eq!(controller().status(), "1234 Connected");
        let off = Controller::new(VirtualPositioner::disconnected()).unwrap();
        assert_eq!(off.status(), "Disconnected");
        assert_eq!(off.positions(), [0; 3]);
    }

    #[test]
    fn step_parsing() {
        assert_eq!(parse_step("1").unwrap(), 1000);
        assert_eq!(parse_step(" 0.25 ").unwrap(), 250);
        assert_eq!(parse_step("-1.5").unwrap(), -1500);
        assert_eq!(parse_step("0.0019").unwrap(), 1);
        assert!(matches!(parse_step("abc"), Err(Error::InvalidStepSize(_))));
        assert!(parse_step("inf").is_err());
        assert!(parse_step("1e16").is_err());
        assert!(parse_step("").is_err());
    }

    #[test]
    fn move_enables_only_target_axis() {
        let mut ctl = controller();
        let target = ctl.move_axis(Axis::Y, Direction::Plus).unwrap();
        assert_eq!(target, -1000);
        assert_eq!(ctl.device().outputs(), [false, true, false]);
        assert_eq!(ctl.device().positions(), [5000, -1000, 0]);
        assert_eq!(ctl.position_text(Axis::Y), "-1");
        ctl.set_step_text(Axis::X, "2.5");
        ctl.move_axis(Axis::X, Direction::Minus).unwrap();
        assert_eq!(ctl.device().outputs(), [true, false, false]);
        assert_eq!(ctl.positions()[0], 2500);
        assert_eq!(ctl.position_text(Axis::X), "2.5");
    }

    #[test]
    fn zero_position_refreshed_before_move() {
        let mut ctl = controller();
        let calls_before = ctl.device().log().len();
        ctl.move_axis(Axis::Z, Direction::Plus).unwrap();
        let calls = &ctl.device().log()[calls_before..];
        assert_eq!(
            calls,
            &[
                DeviceCall::SetOutput(Axis::Z, true),
                DeviceCall::SetOutput(Axis::X, false),
                DeviceCall::SetOutput(Axis::Y, false),
                DeviceCall::GetPosition(Axis::Z),
                DeviceCall::MoveAbsolute(Axis::Z, 1000),
            ]
        );
    }

    #[test]
    fn bad_step_leaves_position() {
        let mut ctl = controller();
        ctl.set_step_text(Axis::X, "one");
        assert!(ctl.move_axis(Axis::X, Direction::Plus).is_err());
        assert_eq!(ctl.positions()[0], 5000);
        assert_eq!(ctl.device().positions()[0], 5000);
    }

    #[test]
    fn disconnected_device_errors() {
        let mut ctl = Controller::new(VirtualPositioner::disconnected()).unwrap();
        assert!(matches!(ctl.read(), Err(Error::Device(_))));
        assert!(ctl.move_axis(Axis::X, Direction::Plus).is_err());
    }

    #[test]
    fn shutdown_disables_and_closes_once() {
        let mut ctl = controller();
        ctl.move_axis(Axis::X, Direction::Plus).unwrap();
        ctl.shutdown().unwrap();
        assert_eq!(ctl.device().outputs(), [false; 3]);
        assert!(ctl.device().is_closed());
        let n = ctl.device().log().len();
        ctl.shutdown().unwrap();
        assert_eq!(ctl.device().log().len(), n);
        assert_eq!(ctl.device().log().last(), Some(&DeviceCall::Close));
    }

    #[test]
    fn axis_indices() {
        assert_eq!(Axis::from_index(2).unwrap(), Axis::Z);
        assert!(matches!(Axis::from_index(3), Err(Error::InvalidAxis(3))));
        assert_eq!(Axis::Y.index(), 1);
    }

    #[test]
    fn command_parsing() {
        use Axis::*;
        use Direction::*;
        assert_eq!(parse_command("Next").unwrap(), Command::Move(X, Plus));
        assert_eq!(parse_command("delete").unwrap(), Command::Move(X, Minus));
        assert_eq!(parse_command("F1").unwrap(), Command::Move(Z, Minus));
        assert_eq!(parse_command("Escape").unwrap(), Command::Focus);
        assert_eq!(parse_command("Return").unwrap(), Command::Read);
        assert_eq!(parse_command("y-").unwrap(), Command::Move(Y, Minus));
        assert_eq!(parse_command(" Z + ").unwrap(), Command::Move(Z, Plus));
        assert_eq!(parse_command("read").unwrap(), Command::Read);
        assert_eq!(
            parse_command("step x 0.5").unwrap(),
            Command::SetStep(X, "0.5".to_string()),
        );
        assert_eq!(parse_command("quit").unwrap(), Command::Quit);
        assert!(parse_command("w+").is_err());
    }

    #[test]
    fn keymap_order_and_rebind() {
        let mut keys = KeyMap::new().unwrap();
        let names: Vec<&str> = keys.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["Next", "Delete", "Home", "End", "F2", "F1", "Escape", "Return"]);
        keys.bind("Up", Command::Move(Axis::Y, Direction::Plus));
        assert_eq!(keys.parse("up").unwrap(), Command::Move(Axis::Y, Direction::Plus));
        assert_eq!(keys.len(), 9);
    }

    #[test]
    fn rebinding_ignores_key_case() {
        let mut keys = KeyMap::new().unwrap();
        keys.bind("return", Command::Help);
        assert_eq!(keys.len(), 8);
        assert_eq!(keys.get("Return"), Some(&Command::Help));
        assert_eq!(keys.parse("RETURN").unwrap(), Command::Help);
        let names: Vec<&str> = keys.iter().map(|(k, _)| k).collect();
        assert_eq!(names[7], "return");
    }

    #[test]
    fn oversized_step_rejected() {
        let mut ctl = controller();
        ctl.set_step_text(Axis::X, "1e16");
        assert!(matches!(
            ctl.move_axis(Axis::X, Direction::Plus),
            Err(Error::InvalidStepSize(_)),
        ));
        assert_eq!(ctl.positions()[0], 5000);
        assert_eq!(ctl.device().positions()[0], 5000);
        assert!(parse_step("1e6").is_ok());
        assert!(parse_step("1000001").is_err());
        assert!(parse_step("-1e300").is_err());
    }

    #[test]
    fn overflowing_target_rejected() {
        let device = VirtualPositioner::new(1, [i64::MAX - 10, 0, 0]);
        let mut ctl = Controller::new(device).unwrap();
        assert!(ctl.move_axis(Axis::X, Direction::Plus).is_err());
        assert_eq!(ctl.positions()[0], i64::MAX - 10);
        assert_eq!(ctl.device().positions()[0], i64::MAX - 10);
    }

    #[test]
    fn failed_move_keeps_cached_position() {
        let device = VirtualPositioner::new(7, [5000, 0, 0])
            .fail_on(DeviceCall::MoveAbsolute(Axis::X, 0));
        let mut ctl = Controller::new(device).unwrap();
        assert!(matches!(
            ctl.move_axis(Axis::X, Direction::Plus),
            Err(Error::Device(_)),
        ));
        assert_eq!(ctl.positions()[0], 5000);
        assert!(ctl.move_axis(Axis::X, Direction::Plus).is_err());
        assert_eq!(ctl.positions()[0], 5000);
        assert_eq!(ctl.device().positions()[0], 5000);
    }

    #[test]
    fn shutdown_continues_past_failures() {
        let device = VirtualPositioner::new(7, [1, 2, 3])
            .fail_on(DeviceCall::SetOutput(Axis::X, false));
        let mut ctl = Controller::new(device).unwrap();
        // each move enables its axis, then fails disabling X
        assert!(ctl.move_axis(Axis::Y, Direction::Plus).is_err());
        assert!(ctl.move_axis(Axis::Z, Direction::Plus).is_err());
        assert_eq!(ctl.device().outputs(), [false, true, true]);
        assert!(matches!(ctl.shutdown(), Err(Error::Device(_))));
        let log = ctl.device().log();
        let tail = &log[log.len() - 4..];
        assert_eq!(
            tail,
            &[
                DeviceCall::SetOutput(Axis::X, false),
                DeviceCall::SetOutput(Axis::Y, false),
                DeviceCall::SetOutput(Axis::Z, false),
                DeviceCall::Close,
            ]
        );
        assert_eq!(ctl.device().outputs(), [false; 3]);
        assert!(ctl.device().is_closed());
    }
}
