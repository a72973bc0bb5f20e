//! # Carebook HTTP
//!
//! [`HttpBookingApi`] implements [`carebook_core::BookingApi`] against the remote booking
//! API with reqwest:
//! - choice lists are JSON `GET`s built from a [`carebook_core::StepQuery`]
//! - bookings are a multipart `POST /bookings` carrying the submission key in the
//!   `Idempotency-Key` header
//!
//! Non-2xx responses become [`carebook_core::ApiError::Status`] with the decoded error
//! body, if any; the wizard decides what each status means.

mod client;

pub use client::HttpBookingApi;
