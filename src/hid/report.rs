/// HID report descriptor for a U2F token: 64-byte vendor-defined input and
/// output reports on the FIDO Alliance usage page. Hosts discover U2F
/// tokens by this usage page, so the bytes must stay exactly as published
/// in the FIDO HID spec.
pub const REPORT_DESCRIPTOR: [u8; 34] = [
    0x06, 0xd0, 0xf1, /* Usage Page: FIDO Alliance (0xF1D0)          */
    0x09, 0x01, /*       Usage: U2F Authenticator Device (0x01)      */
    0xa1, 0x01, /*       Collection: Application                     */
    0x09, 0x20, /*       - Usage: Input Report Data (0x20)           */
    0x15, 0x00, /*       - Logical Minimum (0)                       */
    0x26, 0xff, 0x00, /* - Logical Maximum (255)                     */
    0x75, 0x08, /*       - Report Size (8)                           */
    0x95, 0x40, /*       - Report Count (64)                         */
    0x81, 0x02, /*       - Input (Data, Absolute, Variable)          */
    0x09, 0x21, /*       - Usage: Output Report Data (0x21)          */
    0x15, 0x00, /*       - Logical Minimum (0)                       */
    0x26, 0xff, 0x00, /* - Logical Maximum (255)                     */
    0x75, 0x08, /*       - Report Size (8)                           */
    0x95, 0x40, /*       - Report Count (64)                         */
    0x91, 0x02, /*       - Output (Data, Absolute, Variable)         */
    0xc0, /*             End Collection                              */
];

pub const HID_REPORT_SIZE: usize = 64;
