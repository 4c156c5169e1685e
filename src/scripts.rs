//! In-page scripts run against Kindle Cloud Reader.
//!
//! The reader keeps its library and reading positions in client-side
//! modules reachable through `KindleModuleManager`. These scripts read that
//! state and serialize it to plain JSON.

use crate::credentials::Credentials;
use crate::runner::Script;

pub const PROBE_PAGE: &str = "probe_page";
pub const SUBMIT_CREDENTIALS: &str = "submit_credentials";
pub const READER_READY: &str = "reader_ready";
pub const READER_MARKER: &str = "reader_marker";
pub const LIBRARY_METADATA: &str = "library_metadata";
pub const BOOK_METADATA: &str = "book_metadata";
pub const BOOK_PROGRESS: &str = "book_progress";

const PROBE_PAGE_JS: &str = r#"
var banner = document.getElementById('auth-error-message-box')
    || document.querySelector('#auth-warning-message-box, .a-alert-error');
return {
    signin_form: !!document.getElementById('ap_email') || !!document.querySelector('form[name="signIn"]'),
    error_banner: banner ? (banner.innerText || '').trim() : null,
    challenge_form: !!document.getElementById('auth-mfa-otpcode')
        || !!document.getElementById('auth-captcha-image')
        || !!document.querySelector('form[name="claimspicker"], form.cvf-widget-form'),
    reader_frame: !!document.getElementById('KindleReaderIFrame')
        || !!document.getElementById('KindleLibraryIFrame')
        || !!document.getElementById('amzn_kcr'),
    stale: window.__lectorSubmitted === true,
    url: window.location.href,
    title: document.title || ''
};
"#;

const SUBMIT_CREDENTIALS_JS: &str = r#"
var email = document.getElementById('ap_email');
var password = document.getElementById('ap_password');
if (!email || !password) {
    return false;
}
email.value = args[0];
password.value = args[1];
window.__lectorSubmitted = true;
var submit = document.getElementById('signInSubmit');
if (submit) {
    submit.click();
} else {
    password.form.submit();
}
return true;
"#;

const READER_READY_JS: &str = r#"
(function check() {
    var w = readerWindow();
    if (w && w.KindleModuleManager && w.Kindle
            && w.KindleModuleManager.isModuleInitialized(w.Kindle.MODULE.DB_CLIENT)) {
        done(true);
        return;
    }
    setTimeout(check, 250);
})();
"#;

const READER_MARKER_JS: &str = r#"
var w = readerWindow();
return !!(w && w.KindleModuleManager && w.Kindle);
"#;

const LIBRARY_METADATA_JS: &str = r#"
var w = readerWindow();
if (!w || !w.KindleModuleManager) {
    throw new Error('reader application is not loaded');
}
w.KindleModuleManager
    .getModuleSync(w.Kindle.MODULE.DB_CLIENT)
    .getAppDb()
    .getAllBooks()
    .done(function (books) {
        var out = [];
        for (var i = 0; i < books.length; i++) {
            var b = books[i];
            out.push(b ? { asin: b.asin, title: b.title, authors: b.authors } : null);
        }
        done(out);
    })
    .fail(function (err) {
        done({__lector_error: 'library query failed: ' + String(err)});
    });
"#;

const BOOK_METADATA_JS: &str = r#"
var w = readerWindow();
if (!w || !w.KindleModuleManager) {
    throw new Error('reader application is not loaded');
}
w.KindleModuleManager
    .getModuleSync(w.Kindle.MODULE.DB_CLIENT)
    .getAppDb()
    .getBook(args[0], function (b) {
        done(b ? { asin: b.asin, title: b.title, authors: b.authors } : null);
    });
"#;

// Opens the book in a private module manager so the reader's own state is
// left alone, then converts start/current/end positions to locations and,
// when a page map exists, to page numbers.
const BOOK_PROGRESS_JS: &str = r#"
var asin = args[0];

function fail(message) {
    done({__lector_error: message});
}

function privateManager(w, modules) {
    var kmm = w.KindleModuleManagerFactory();
    kmm.BOOK_CONTEXT = 'book_context';
    modules.forEach(function (m) {
        if (!kmm.isModuleRegistered(m) && w.KindleModuleManager.isModuleInitialized(m)) {
            kmm.registerModule(m, w.KindleModuleManager.getModuleSync(m));
        }
    });
    return kmm;
}

function pagesFor(w, kmm, info, context, current, ready) {
    if (!context.pageNumberUrl) {
        ready(null);
        return;
    }
    info.getContext = function () { return context; };
    kmm.getModuleSync(w.Kindle.MODULE.PageNumberManager)
        .getPageNumbers(info)
        .done(function (converter) {
            var range = converter.getPageNumberRanges().arabic;
            if (!range) {
                ready(null);
                return;
            }
            var low = converter.positionFromPageNumber(range.minPage);
            var high = converter.positionFromPageNumber(range.maxPage);
            if (low == -1 || high == -1) {
                ready(null);
                return;
            }
            var clamped = Math.min(Math.max(current, low), high);
            ready([range.minPage, parseInt(converter.pageNumberFromPosition(clamped), 10), range.maxPage]);
        })
        .fail(function () { ready(null); });
}

function readProgress(w) {
    if (document.getElementById('ap_email')) {
        done({status: 'signed_out'});
        return;
    }
    var db = w.KindleModuleManager.getModuleSync(w.Kindle.MODULE.DB_CLIENT).getAppDb();
    db.getBook(asin, function (known) {
        if (!known) {
            done({status: 'unknown_book'});
            return;
        }
        var kmm = privateManager(w, [
            w.Kindle.MODULE.DB_CLIENT,
            w.Kindle.MODULE.SERVICE_CLIENT,
            w.Kindle.MODULE.METRICS_MANAGER,
            w.Kindle.MODULE.PageNumberManager
        ]);
        kmm.getModuleSync(kmm.SERVICE_CLIENT)
            .startReading({asin: asin})
            .fail(function () { done({status: 'unknown_book'}); })
            .done(function (context) {
                kmm.registerModule(kmm.BOOK_CONTEXT, context);
                var provider = w.NetworkContentProvider.create({
                    context: context,
                    bookInfo: w.KindleReaderBookInfoProvider.BookInfo({asin: null}, kmm),
                    asin: asin
                });
                kmm.registerModuleWithDeferred(kmm.BOOK_METADATA, provider.getMetadata());
                kmm.registerModuleWithDeferred(kmm.BOOK_FRAGMAP, provider.getFragmap());
                kmm.getModuleList([kmm.BOOK_CONTEXT, kmm.BOOK_METADATA, kmm.BOOK_FRAGMAP])
                    .fail(function () { fail('book modules failed to load'); })
                    .done(function (mods) {
                        var metadata = mods[kmm.BOOK_METADATA];
                        var info = w.KindleReaderBookInfoProvider.BookInfo({asin: metadata.asin}, kmm);
                        var current = info.getFurthestPositionReadData().position;
                        var positions = [metadata.startPosition, current, metadata.endPosition];
                        var converter = info.getLocationConverter();
                        w.$.when.apply(w.$, positions.map(function (p) {
                            return converter.locationFromPosition(p);
                        })).done(function () {
                            var locations = Array.prototype.slice.call(arguments);
                            pagesFor(w, kmm, info, context, current, function (pages) {
                                done({
                                    status: 'ok',
                                    asin: asin,
                                    positions: positions,
                                    locations: locations,
                                    pages: pages
                                });
                            });
                        });
                    });
            });
    });
}

(function waitForReader() {
    if (document.getElementById('ap_email')) {
        done({status: 'signed_out'});
        return;
    }
    var w = readerWindow();
    if (w && w.KindleModuleManager && w.Kindle
            && w.KindleModuleManager.isModuleInitialized(w.Kindle.MODULE.DB_CLIENT)) {
        readProgress(w);
        return;
    }
    setTimeout(waitForReader, 250);
})();
"#;

/// Reports which sign-in/reader signals the current page shows.
pub fn probe_page() -> Script {
    Script::sync(PROBE_PAGE, PROBE_PAGE_JS)
}

/// Fills and submits the sign-in form. Returns false if the form is absent.
pub fn submit_credentials(credentials: &Credentials) -> Script {
    Script::sync(SUBMIT_CREDENTIALS, SUBMIT_CREDENTIALS_JS)
        .arg(credentials.username())
        .arg(credentials.password())
}

/// Completes once the reader's module manager and DB client are initialized.
pub fn reader_ready() -> Script {
    Script::asynchronous(READER_READY, READER_READY_JS)
}

/// True when the reader application is loaded on the current page.
pub fn reader_marker() -> Script {
    Script::sync(READER_MARKER, READER_MARKER_JS)
}

/// Array of `{asin, title, authors}` for every book in the library.
pub fn library_metadata() -> Script {
    Script::asynchronous(LIBRARY_METADATA, LIBRARY_METADATA_JS)
}

/// `{asin, title, authors}` for one book, or `null`.
pub fn book_metadata(asin: &str) -> Script {
    Script::asynchronous(BOOK_METADATA, BOOK_METADATA_JS).arg(asin)
}

/// Tagged progress reply: `ok`, `unknown_book` or `signed_out`.
pub fn book_progress(asin: &str) -> Script {
    Script::asynchronous(BOOK_PROGRESS, BOOK_PROGRESS_JS).arg(asin)
}
