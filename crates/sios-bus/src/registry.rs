use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt::Write;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

use crate::error::{Conflict, Error};
use crate::resource::{self, BusId, Resource, ResourceType};

/// Decides whether a line number exists for a given line kind.
///
/// The bus consults this for every line of a GPIO or XGPIO resource before
/// looking for conflicts. `kind` has the flag bits masked out.
pub trait PinValidator {
    fn is_valid(&self, pin: u32, kind: ResourceType) -> bool;

    /// Whether every line of every kind is valid. When this returns `true`
    /// the per-line checks are skipped, so ranges of any width cost the
    /// same.
    fn accepts_all(&self) -> bool {
        false
    }
}

impl<F: Fn(u32, ResourceType) -> bool> PinValidator for F {
    fn is_valid(&self, pin: u32, kind: ResourceType) -> bool {
        self(pin, kind)
    }
}

/// Validator that accepts every line.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl PinValidator for AcceptAll {
    fn is_valid(&self, _pin: u32, _kind: ResourceType) -> bool {
        true
    }

    fn accepts_all(&self) -> bool {
        true
    }
}

/// Handle to one reservation held in a [`ResourceRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReservationToken(u32);

struct Reservation {
    token: ReservationToken,
    owner: BusId,
    name: String,
    ty: ResourceType,
    start: u32,
    end: u32,
}

impl Reservation {
    fn conflicts_with(&self, res: &Resource) -> bool {
        self.ty.kind() == res.ty().kind() && res.overlaps(self.start, self.end)
    }

    fn snapshot(&self) -> Conflict {
        Conflict {
            name: self.name.clone(),
            owner: self.owner.clone(),
            ty: self.ty,
            start: self.start,
            end: self.end,
        }
    }
}

struct State {
    next_token: u32,
    /// Kept in reservation order; conflict scans report the oldest hit.
    reserved: Vec<Reservation>,
}

/// The set of line ranges currently held, and the exclusivity rule over
/// them.
///
/// Two reservations conflict when their kinds (flag bits masked out) are
/// equal and their inclusive ranges intersect. Every operation, including
/// the read-only ones, takes the same lock, so all registry operations are
/// mutually exclusive.
pub struct ResourceRegistry<M: RawMutex, V: PinValidator> {
    validator: V,
    state: Mutex<M, RefCell<State>>,
}

impl<M: RawMutex, V: PinValidator> ResourceRegistry<M, V> {
    /// Empty registry checking lines with `validator`.
    pub const fn new(validator: V) -> Self {
        Self {
            validator,
            state: Mutex::new(RefCell::new(State {
                next_token: 1,
                reserved: Vec::new(),
            })),
        }
    }

    /// Whether `pin` is a real line of kind `kind`.
    pub fn validate_kind_membership(&self, pin: u32, kind: ResourceType) -> bool {
        self.validator.is_valid(pin, kind.kind())
    }

    /// Reserve `res` on behalf of `owner` under attribute name `name`.
    ///
    /// Fails with [`Error::InvalidArgument`] for an inverted range or a line
    /// the validator rejects, and with [`Error::ResourceConflict`] when an
    /// existing reservation of the same kind overlaps. Nothing is recorded
    /// on failure.
    pub fn request(
        &self,
        owner: &BusId,
        name: &str,
        res: &Resource,
    ) -> Result<ReservationToken, Error> {
        if res.start() > res.end() {
            return Err(Error::InvalidArgument);
        }
        if res.ty().is_gpio_class()
            && !self.validator.accepts_all()
            && !(res.start()..=res.end())
                .all(|pin| self.validate_kind_membership(pin, res.ty()))
        {
            return Err(Error::InvalidArgument);
        }

        self.state.lock(|state| {
            let mut state = state.borrow_mut();
            if let Some(other) =
                state.reserved.iter().find(|r| r.conflicts_with(res))
            {
                return Err(Error::ResourceConflict(other.snapshot()));
            }
            let token = ReservationToken(state.next_token);
            state.next_token = state.next_token.wrapping_add(1);
            state.reserved.push(Reservation {
                token,
                owner: owner.clone(),
                name: String::from(name),
                ty: res.ty(),
                start: res.start(),
                end: res.end(),
            });
            Ok(token)
        })
    }

    /// Drop a reservation. Unknown or already released tokens are ignored.
    pub fn release(&self, token: ReservationToken) {
        self.state.lock(|state| {
            state.borrow_mut().reserved.retain(|r| r.token != token);
        })
    }

    /// Report what would block `res` without reserving anything.
    pub fn find_conflict(&self, res: &Resource) -> Option<Conflict> {
        self.state.lock(|state| {
            state
                .borrow()
                .reserved
                .iter()
                .find(|r| r.conflicts_with(res))
                .map(Reservation::snapshot)
        })
    }

    /// Whether `token` still names a held reservation.
    pub fn is_reserved(&self, token: ReservationToken) -> bool {
        self.state
            .lock(|state| state.borrow().reserved.iter().any(|r| r.token == token))
    }

    /// Attribute name a reservation was made under.
    pub fn name_of(&self, token: ReservationToken) -> Option<String> {
        self.state.lock(|state| {
            state
                .borrow()
                .reserved
                .iter()
                .find(|r| r.token == token)
                .map(|r| r.name.clone())
        })
    }

    /// Diagnostic line of one reservation, `None` if it is not held.
    pub fn render(&self, token: ReservationToken) -> Option<String> {
        self.state.lock(|state| {
            let state = state.borrow();
            let r = state.reserved.iter().find(|r| r.token == token)?;
            let mut out = String::new();
            resource::render_line(&mut out, &r.name, r.ty, r.start, r.end)
                .ok()?;
            Some(out)
        })
    }

    /// Write the diagnostic line of every reservation, oldest first.
    pub fn dump(&self, out: &mut impl Write) -> core::fmt::Result {
        self.state.lock(|state| {
            state.borrow().reserved.iter().try_for_each(|r| {
                resource::render_line(out, &r.name, r.ty, r.start, r.end)
            })
        })
    }

    /// Number of reservations held.
    pub fn len(&self) -> usize {
        self.state.lock(|state| state.borrow().reserved.len())
    }

    /// Whether no line is reserved.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
