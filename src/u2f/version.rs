use super::apdu::*;

const VERSION_STRING: &[u8] = b"U2F_V2";

pub(crate) fn handle(request: &Apdu) -> Response {
    if !request.data.is_empty() {
        return Response::status(SW_WRONG_DATA);
    }
    Response::new(VERSION_STRING.to_vec(), SW_NO_ERROR)
}
