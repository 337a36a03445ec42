pub mod base;

// The only backend we ship talks to libusb. Tests swap in a scripted one.
pub mod libusb;

#[cfg(test)]
pub(crate) mod mock;
