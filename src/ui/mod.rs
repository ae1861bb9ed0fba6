// UI module - Slint window wiring
//
// This module contains:
// - EventLoopBridge: Marshals updates from background threads onto the Slint event loop
// - GuiController: Connects the window's callbacks to the shell and renders state changes

pub mod bridge;
pub mod controller;

pub use bridge::{EventLoopBridge, EventLoopBridgeHandle};
pub use controller::GuiController;
