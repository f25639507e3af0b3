pub mod availability;
pub mod booking;
pub mod caller;
pub mod customer;
pub mod notification;
pub mod vehicle;

pub use availability::{BusyWindow, RentalPeriod};
pub use booking::{Booking, BookingRef, BookingStatus, PaymentStatus};
pub use caller::{CallerIdentity, Role};
pub use customer::{Customer, NewCustomer};
pub use notification::PaymentNotification;
pub use vehicle::{NewVehicle, Vehicle, VehicleStatus};
